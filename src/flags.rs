//! Minimal command-line flag registry shared by the scenario binaries.
//!
//! Flags are `--name` or `--name=value`. An unrecognized flag prints every
//! recognized flag with its help text and exits with failure status.

use std::collections::BTreeMap;

pub struct Flags {
    // Mapping from name to help string.
    names: BTreeMap<String, String>,
    values: BTreeMap<String, String>,
}

impl Flags {
    /// An empty registry with the flags every scenario recognizes.
    pub fn with_common() -> Self {
        let mut flags = Self {
            names: BTreeMap::new(),
            values: BTreeMap::new(),
        };
        flags.define(
            "--queue",
            "Type of queue to use, can be graphics/compute/transfer.",
        );
        flags.define("--secondary", "Use secondary command buffer.");
        flags.define("--debug_utils", "Add debug utils names and labels.");
        flags
    }

    pub fn define(&mut self, name: &str, help: &str) {
        self.names.insert(name.to_string(), help.to_string());
    }

    /// Parse process arguments (the first is skipped as the program name).
    /// Exits with failure status on any unrecognized flag.
    pub fn parse(mut self, args: impl IntoIterator<Item = String>) -> Self {
        if let Err(offender) = self.try_parse(args.into_iter().skip(1)) {
            self.print_help_and_exit(Some(&offender));
        }
        self
    }

    fn try_parse(&mut self, args: impl Iterator<Item = String>) -> Result<(), String> {
        for arg in args {
            let (key, value) = match arg.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (arg, String::new()),
            };
            if !self.names.contains_key(&key) {
                return Err(key);
            }
            self.values.insert(key, value);
        }
        Ok(())
    }

    fn print_help_and_exit(&self, flag: Option<&str>) -> ! {
        if let Some(flag) = flag {
            if flag != "--help" && flag != "-h" {
                eprintln!("Invalid flag: {flag}");
            }
        }
        eprintln!("Flags:");
        for (name, help) in &self.names {
            eprintln!("  {name}: {help}");
        }
        std::process::exit(1);
    }

    /// The value of a flag that was passed, or `None` if it was not.
    /// A flag passed without `=value` yields an empty string.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_with_and_without_values() {
        let mut flags = Flags::with_common();
        flags
            .try_parse(
                ["--queue=compute", "--secondary"]
                    .iter()
                    .map(|s| s.to_string()),
            )
            .unwrap();
        assert_eq!(flags.get("--queue"), Some("compute"));
        assert_eq!(flags.get("--secondary"), Some(""));
        assert!(flags.is_set("--secondary"));
        assert!(!flags.is_set("--debug_utils"));
    }

    #[test]
    fn rejects_unknown_flags() {
        let mut flags = Flags::with_common();
        let err = flags
            .try_parse(["--bogus=1".to_string()].into_iter())
            .unwrap_err();
        assert_eq!(err, "--bogus");
    }

    #[test]
    fn later_value_wins() {
        let mut flags = Flags::with_common();
        flags
            .try_parse(
                ["--queue=graphics", "--queue=transfer"]
                    .iter()
                    .map(|s| s.to_string()),
            )
            .unwrap();
        assert_eq!(flags.get("--queue"), Some("transfer"));
    }
}
