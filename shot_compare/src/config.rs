//! Comparison run configuration.
//!
//! Every knob the engine recognizes lives here with an explicit default, and
//! the whole record is passed down to each component. Components never probe
//! for optional settings at runtime.

/// Options for one comparison run.
#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// Device pixel scale, used by the chrome crop-inset math.
    pub dppx: f64,
    /// Percentage of per-channel slack before two pixels count as differing.
    pub fuzz_tolerance: f64,
    /// Re-run and replace an existing completed directory record.
    pub overwrite: bool,
    /// Load prior completed records into the returned map instead of
    /// skipping them silently.
    pub include_completed: bool,
    /// Emit a composite artifact even for pairs classified as similar.
    pub output_similar_composite: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            dppx: 1.0,
            fuzz_tolerance: 3.0,
            overwrite: false,
            include_completed: false,
            output_similar_composite: false,
        }
    }
}

impl CompareConfig {
    pub fn with_dppx(mut self, dppx: f64) -> Self {
        self.dppx = dppx;
        self
    }

    pub fn with_fuzz_tolerance(mut self, fuzz_tolerance: f64) -> Self {
        self.fuzz_tolerance = fuzz_tolerance;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_include_completed(mut self, include_completed: bool) -> Self {
        self.include_completed = include_completed;
        self
    }

    pub fn with_output_similar_composite(mut self, output_similar_composite: bool) -> Self {
        self.output_similar_composite = output_similar_composite;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CompareConfig::default();
        assert_eq!(config.dppx, 1.0);
        assert_eq!(config.fuzz_tolerance, 3.0);
        assert!(!config.overwrite);
        assert!(!config.include_completed);
        assert!(!config.output_similar_composite);
    }

    #[test]
    fn builder_sets_each_field() {
        let config = CompareConfig::default()
            .with_dppx(2.0)
            .with_fuzz_tolerance(5.0)
            .with_overwrite(true)
            .with_include_completed(true)
            .with_output_similar_composite(true);
        assert_eq!(config.dppx, 2.0);
        assert_eq!(config.fuzz_tolerance, 5.0);
        assert!(config.overwrite);
        assert!(config.include_completed);
        assert!(config.output_similar_composite);
    }
}
