//! Runtime configuration shared by store bootstrap code.

/// Configuration consumed by the session store and its connection source.
///
/// Endpoint, auth, and I/O deadlines belong to the external configuration facility and are not
/// modeled here; the store only carries the knobs its own read/write paths consult.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum total xids returned by a single multi-status query.
    pub query_limit: usize,
    /// List window used when draining a branch list in chunks.
    pub branch_scan_window: usize,
    /// Number of backing-store handles kept by the connection source.
    pub pool_size: usize,
}

impl StoreConfig {
    /// Overrides the multi-status query limit, clamped to at least one xid.
    pub fn set_query_limit(&mut self, query_limit: usize) {
        self.query_limit = query_limit.max(1);
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            query_limit: 100,
            branch_scan_window: 20,
            pool_size: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StoreConfig;
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn default_limits_match_documented_values() {
        let config = StoreConfig::default();
        assert_that!(config.query_limit, eq(100_usize));
        assert_that!(config.branch_scan_window, eq(20_usize));
        assert_that!(config.pool_size, eq(8_usize));
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(500, 500)]
    fn query_limit_override_is_clamped(#[case] requested: usize, #[case] effective: usize) {
        let mut config = StoreConfig::default();
        config.set_query_limit(requested);
        assert_that!(config.query_limit, eq(effective));
    }
}
