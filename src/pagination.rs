//! Page slicing for any ordered collection

/// Number of pages needed for `len` items; zero for an empty collection.
pub fn total_pages(len: usize, per_page: usize) -> usize {
    let per_page = per_page.max(1);
    len.div_ceil(per_page)
}

/// Clamp `page` into `[1, total_pages]`, or to 1 when there are no pages.
pub fn clamp_page(page: usize, total_pages: usize) -> usize {
    page.clamp(1, total_pages.max(1))
}

/// The items of page `page` (1-indexed) after clamping.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> &[T] {
    let per_page = per_page.max(1);
    let page = clamp_page(page, total_pages(items.len(), per_page));
    let start = ((page - 1) * per_page).min(items.len());
    let end = (start + per_page).min(items.len());
    &items[start..end]
}

/// Current page and page size of one grid.
///
/// The paginator does not watch the collection. Whoever changes what is
/// being paged (filters, search, sort) calls [`Paginator::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    page: usize,
    per_page: usize,
}

impl Paginator {
    pub fn new(per_page: usize) -> Self {
        Self {
            page: 1,
            per_page: per_page.max(1),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn set_per_page(&mut self, per_page: usize) {
        self.per_page = per_page.max(1);
        self.page = 1;
    }

    /// Back to the first page.
    pub fn reset(&mut self) {
        self.page = 1;
    }

    /// Move to `page`, clamped for a collection of `len` items.
    pub fn go_to(&mut self, page: usize, len: usize) {
        self.page = clamp_page(page, total_pages(len, self.per_page));
    }

    /// No-op on the last page.
    pub fn next(&mut self, len: usize) {
        if self.page < total_pages(len, self.per_page) {
            self.page += 1;
        }
    }

    /// No-op on the first page.
    pub fn previous(&mut self) {
        if self.page > 1 {
            self.page -= 1;
        }
    }

    pub fn total_pages(&self, len: usize) -> usize {
        total_pages(len, self.per_page)
    }

    /// The current page's items; the page is clamped, not stored.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        paginate(items, self.page, self.per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_pages() {
        let items: Vec<u32> = (1..=10).collect();
        assert_eq!(paginate(&items, 1, 4), &[1, 2, 3, 4]);
        assert_eq!(paginate(&items, 3, 4), &[9, 10]);
        assert_eq!(total_pages(items.len(), 4), 3);
    }

    #[test]
    fn clamps_out_of_range_pages() {
        let items: Vec<u32> = (1..=10).collect();
        assert_eq!(paginate(&items, 99, 4), &[9, 10]);
        assert_eq!(paginate(&items, 0, 4), &[1, 2, 3, 4]);
    }

    #[test]
    fn empty_collection() {
        let items: Vec<u32> = Vec::new();
        assert_eq!(total_pages(0, 4), 0);
        assert!(paginate(&items, 1, 4).is_empty());
        assert!(paginate(&items, 7, 4).is_empty());
        assert_eq!(clamp_page(7, 0), 1);
    }

    #[test]
    fn zero_per_page_counts_as_one() {
        let items = [1, 2, 3];
        assert_eq!(total_pages(3, 0), 3);
        assert_eq!(paginate(&items, 2, 0), &[2]);
    }

    #[test]
    fn navigation_stops_at_boundaries() {
        let mut paginator = Paginator::new(5);
        paginator.previous();
        assert_eq!(paginator.page(), 1);

        paginator.next(12);
        paginator.next(12);
        paginator.next(12);
        assert_eq!(paginator.page(), 3);

        paginator.go_to(10, 12);
        assert_eq!(paginator.page(), 3);

        paginator.reset();
        assert_eq!(paginator.page(), 1);

        paginator.next(0);
        assert_eq!(paginator.page(), 1);
    }

    #[test]
    fn stale_page_is_clamped_when_slicing() {
        let mut paginator = Paginator::new(2);
        paginator.go_to(4, 8);
        let shrunk = [1, 2, 3];
        assert_eq!(paginator.slice(&shrunk), &[3]);
    }
}
