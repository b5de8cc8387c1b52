//! Cache statistics and monitoring

use serde::{Deserialize, Serialize};

/// Counters for a single memory tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that returned a live entry
    pub hits: u64,

    /// Lookups that found nothing, including expired entries
    pub misses: u64,

    /// Entries dropped on access because their TTL elapsed
    pub expirations: u64,

    /// Entries dropped to stay within the entry or cost budget
    pub evictions: u64,

    /// Live entries at the time the snapshot was taken
    pub entries: usize,

    /// Summed cost of live entries in bytes
    pub cost_bytes: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }

        (self.hits as f64 / lookups as f64) * 100.0
    }

    /// Calculate cost usage as a percentage of the budget.
    pub fn usage_percentage(&self, max_cost_bytes: usize) -> f64 {
        if max_cost_bytes == 0 {
            return 0.0;
        }

        (self.cost_bytes as f64 / max_cost_bytes as f64) * 100.0
    }

    /// Returns true if the tier is near its cost budget (>90%).
    pub fn is_near_capacity(&self, max_cost_bytes: usize) -> bool {
        self.usage_percentage(max_cost_bytes) > 90.0
    }

    /// Returns average cost per live entry.
    pub fn average_entry_cost(&self) -> usize {
        if self.entries == 0 {
            0
        } else {
            self.cost_bytes / self.entries
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 75.0);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_capacity_helpers() {
        let stats = CacheStats {
            entries: 4,
            cost_bytes: 950,
            ..Default::default()
        };
        assert_eq!(stats.usage_percentage(1000), 95.0);
        assert!(stats.is_near_capacity(1000));
        assert!(!stats.is_near_capacity(2000));
        assert_eq!(stats.average_entry_cost(), 237);
        assert_eq!(stats.usage_percentage(0), 0.0);
    }
}
