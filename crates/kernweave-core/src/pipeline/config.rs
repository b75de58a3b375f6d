/// Options read once per compilation and shared by every method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitConfig {
    /// Suppress the header and braces of the first loop reached, keeping its
    /// body inline. Used when the target parallelizes the outermost loop
    /// itself (FPGA-style loop flattening).
    pub unwrap_outermost_loop: bool,
    /// Emit a `// BLOCK n` comment on entry to every block.
    pub trace_blocks: bool,
    /// Spaces per scope level.
    pub indent_width: usize,
}

impl Default for EmitConfig {
    fn default() -> Self {
        EmitConfig {
            unwrap_outermost_loop: false,
            trace_blocks: false,
            indent_width: 2,
        }
    }
}

/// Configuration for debug dumps.
///
/// An optional method filter restricts output to matching methods (see
/// [`DebugConfig::should_dump`] for matching rules).
#[derive(Debug, Clone, Default)]
pub struct DebugConfig {
    /// Dump the annotated graph as JSON to stderr before emission.
    pub dump_graph: bool,
    /// Filter dumps to methods whose name matches this string.
    pub method_filter: Option<String>,
}

impl DebugConfig {
    /// A config with all dumps disabled.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` if no filter is set, or if the method name matches
    /// the filter under any of these strategies (tried in order):
    ///
    /// 1. **Case-sensitive substring**: `"reduce"` matches `"Sum::reduce_local"`.
    /// 2. **Case-insensitive substring**: `"REDUCE"` matches `"Sum::reduce_local"`.
    /// 3. **Split-part matching**: if the filter contains `.` or `::`, split on
    ///    those separators and require all parts to appear in the name as
    ///    case-insensitive substrings, so `"sum.local"` matches
    ///    `"Sum::reduce_local"`.
    pub fn should_dump(&self, method_name: &str) -> bool {
        let Some(filter) = self.method_filter.as_deref() else {
            return true;
        };

        if method_name.contains(filter) {
            return true;
        }

        let name_lower = method_name.to_lowercase();
        if name_lower.contains(&filter.to_lowercase()) {
            return true;
        }

        if filter.contains('.') || filter.contains("::") {
            let mut parts = filter.split(['.', ':']).filter(|p| !p.is_empty()).peekable();
            if parts.peek().is_some() && parts.all(|p| name_lower.contains(&p.to_lowercase())) {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debug_with_filter(filter: &str) -> DebugConfig {
        DebugConfig {
            dump_graph: true,
            method_filter: Some(filter.to_string()),
        }
    }

    #[test]
    fn default_emit_config() {
        let cfg = EmitConfig::default();
        assert!(!cfg.unwrap_outermost_loop);
        assert!(!cfg.trace_blocks);
        assert_eq!(cfg.indent_width, 2);
    }

    #[test]
    fn should_dump_no_filter() {
        let cfg = DebugConfig::none();
        assert!(cfg.should_dump("Sum::reduce_local"));
    }

    #[test]
    fn should_dump_substrings() {
        assert!(debug_with_filter("reduce").should_dump("Sum::reduce_local"));
        assert!(debug_with_filter("REDUCE").should_dump("Sum::reduce_local"));
        assert!(!debug_with_filter("scan").should_dump("Sum::reduce_local"));
    }

    #[test]
    fn should_dump_split_parts() {
        let cfg = debug_with_filter("sum.local");
        assert!(cfg.should_dump("Sum::reduce_local"));
        assert!(!cfg.should_dump("Max::reduce_local"));
        assert!(debug_with_filter("Sum::reduce").should_dump("Sum::reduce_local"));
        assert!(!debug_with_filter("Sum.global").should_dump("Sum::reduce_local"));
    }
}
