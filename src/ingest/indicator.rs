//! Activity indicator toggled on every acknowledged frame

use tracing::trace;

#[derive(Debug, Default)]
pub struct ActivityIndicator {
    lit: bool,
    toggles: u64,
}

impl ActivityIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self) {
        self.lit = !self.lit;
        self.toggles += 1;
        trace!("Activity indicator {}", if self.lit { "on" } else { "off" });
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn toggles(&self) -> u64 {
        self.toggles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_flips_and_counts() {
        let mut indicator = ActivityIndicator::new();
        assert!(!indicator.is_lit());

        indicator.toggle();
        assert!(indicator.is_lit());
        indicator.toggle();
        assert!(!indicator.is_lit());
        assert_eq!(indicator.toggles(), 2);
    }
}
