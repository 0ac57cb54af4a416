

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    // Run the vector/chunk consistency checks after every operator pull
    pub verify: bool,
    // Collect per operator timings and row counts and log the profile tree after a query
    pub profile: bool,
}

impl ExecutionConfig {
    pub fn new() -> ExecutionConfig {
        // Read environment variables 'OXIDEXEC_VERIFY' and 'OXIDEXEC_PROFILE'
        // If not set (or unparseable), verification follows debug assertions and profiling is off
        let verify = match std::env::var("OXIDEXEC_VERIFY") {
            Ok(val) => parse_flag(&val).unwrap_or(cfg!(debug_assertions)),
            Err(_) => cfg!(debug_assertions)
        };
        let profile = match std::env::var("OXIDEXEC_PROFILE") {
            Ok(val) => parse_flag(&val).unwrap_or(false),
            Err(_) => false
        };
        ExecutionConfig {
            verify,
            profile
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            verify: cfg!(debug_assertions),
            profile: false
        }
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert!(!ExecutionConfig::default().profile);
    }
}
