use serde::{
    Deserialize,
    Serialize,
};

/// `{offset, size, total}` — the one pagination shape shared by every
/// listing RPC (triage log, ignore list, search), rather than each endpoint
/// inventing its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub size: usize,
    pub total: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: Page,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, offset: usize, total: usize) -> Self {
        let size = data.len();
        Self {
            data,
            pagination: Page {
                offset,
                size,
                total,
            },
        }
    }
}
