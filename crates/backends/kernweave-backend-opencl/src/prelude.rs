/// Lines placed at the top of every generated `.cl` file.
pub const PRELUDE_CL: &str = include_str!("../runtime/prelude.cl");
