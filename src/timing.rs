//! Build phase timing.

use std::time::Instant;

/// Measures how long a build phase took.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    /// Start a new timer with the given phase name.
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Finish the timer and print the elapsed time.
    pub fn finish(self) {
        println!("  {} {}", format_elapsed(self.start.elapsed().as_secs_f64()), self.name);
    }
}

fn format_elapsed(secs: f64) -> String {
    if secs >= 60.0 {
        format!("[{:.1}m]", secs / 60.0)
    } else {
        format!("[{:.1}s]", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(2.04), "[2.0s]");
        assert_eq!(format_elapsed(90.0), "[1.5m]");
    }
}
