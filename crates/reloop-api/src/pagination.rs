use reloop_types::api::Pagination;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: i64 = 100;

/// Page window for `page` (1-based) of `per_page` records out of `total`.
/// `record_to` is the exclusive end of the window and is not clamped to
/// `total`. Offsets saturate, so an absurd page is simply past the end.
pub fn paginate(page: i64, per_page: i64, total: i64) -> Pagination {
    let record_from = (page - 1).saturating_mul(per_page);
    Pagination {
        page,
        record_from,
        record_to: record_from.saturating_add(per_page),
        total_records: total,
        total_pages: (total + per_page - 1) / per_page,
        record_per_page: per_page,
    }
}
