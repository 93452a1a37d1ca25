//! Page arithmetic for the paginate endpoint.

pub const MIN_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub records: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
    /// Index one past the last row shown on this page.
    pub last: u64,
    pub page_range: Vec<u64>,
}

impl Pagination {
    /// `size` and `page` as requested; zero or negative means "not given".
    /// `page` is capped so `page * limit` stays within a PostgreSQL `bigint`.
    pub fn new(size: i64, page: i64) -> Self {
        let limit = if size <= 0 { MIN_LIMIT } else { size as u64 }.clamp(MIN_LIMIT, MAX_LIMIT);
        let page = if page < 1 { 1 } else { page as u64 }.min(i64::MAX as u64 / limit);
        Pagination {
            records: 0,
            page,
            limit,
            pages: 1,
            last: 0,
            page_range: Vec::new(),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.limit
    }

    /// Derives page count, last row and the visible page window from the total row count.
    pub fn set_records(&mut self, records: u64) {
        self.records = records;
        self.pages = records.div_ceil(self.limit).max(1);
        self.last = (self.offset() + self.limit).min(records);
        let to = (self.page + 5).min(self.pages + 1);
        self.page_range = (self.page.saturating_sub(2).max(1)..to).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(Pagination::new(0, 1).limit, 10);
        assert_eq!(Pagination::new(3, 1).limit, 10);
        assert_eq!(Pagination::new(-4, 1).limit, 10);
        assert_eq!(Pagination::new(25, 1).limit, 25);
        assert_eq!(Pagination::new(1000, 1).limit, 100);
    }

    #[test]
    fn page_is_at_least_one() {
        assert_eq!(Pagination::new(10, 0).page, 1);
        assert_eq!(Pagination::new(10, -3).page, 1);
        assert_eq!(Pagination::new(10, 0).offset(), 0);
        assert_eq!(Pagination::new(20, 3).offset(), 40);
    }

    #[test]
    fn huge_page_keeps_offset_in_range() {
        let mut p = Pagination::new(100, i64::MAX);
        assert_eq!(p.page, i64::MAX as u64 / 100);
        assert!(p.offset() + p.limit <= i64::MAX as u64);
        p.set_records(25);
        assert_eq!(p.last, 25);
        assert!(p.page_range.is_empty());
    }

    #[test]
    fn pages_rounds_up_with_minimum_one() {
        for (records, limit, pages) in [(0, 10, 1), (1, 10, 1), (10, 10, 1), (11, 10, 2), (250, 100, 3)] {
            let mut p = Pagination::new(limit, 1);
            p.set_records(records);
            assert_eq!(p.pages, pages, "records={records} limit={limit}");
        }
    }

    #[test]
    fn page_range_window() {
        let mut p = Pagination::new(10, 4);
        p.set_records(200);
        assert_eq!(p.page_range, vec![2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(p.last, 40);

        let mut tail = Pagination::new(10, 3);
        tail.set_records(35);
        assert_eq!(tail.page_range, vec![1, 2, 3, 4]);
        assert_eq!(tail.last, 30);
    }
}
