// Worker constants (no magic values)

/// Pending entries fetched per page during a reclaim pass
pub const MAX_RECLAIM_BATCH: usize = 1000;
