//! # API Limits

/// Caps applied to query parameters.
#[derive(Debug, Clone)]
pub struct ApiLimits {
    /// Maximum results per pending-transaction query.
    pub max_result_limit: usize,
    /// Maximum addresses per filter.
    pub max_addresses: usize,
    /// Developer mode: error detail is returned to callers.
    pub developer_mode: bool,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_result_limit: 25,
            max_addresses: 100,
            developer_mode: false,
        }
    }
}
