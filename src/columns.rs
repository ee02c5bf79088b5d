const BYTE_ORDER_MARK: char = '\u{feff}';

/// Zero-based position of a column within a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex(usize);

impl ColumnIndex {
    pub fn get(self) -> usize {
        self.0
    }

    /// The field for this column, or `None` when `row` is too short.
    pub fn field<S: AsRef<str>>(self, row: &[S]) -> Option<&str> {
        row.get(self.0).map(AsRef::as_ref)
    }
}

/// Finds the first header field equal to `name`, ignoring case.
pub fn resolve<S: AsRef<str>>(header: &[S], name: &str) -> Option<ColumnIndex> {
    header
        .iter()
        .position(|field| eq_ignore_case(strip_bom(field.as_ref()), name))
        .map(ColumnIndex)
}

fn strip_bom(field: &str) -> &str {
    field.strip_prefix(BYTE_ORDER_MARK).unwrap_or(field)
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
