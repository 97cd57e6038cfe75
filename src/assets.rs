use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STOCK_ID: AtomicU64 = AtomicU64::new(1);

pub trait Asset {
    fn ticker(&self) -> &str;
}

impl Asset for Stock {
    fn ticker(&self) -> &str {
        &self.symbol
    }
}

/// A tradeable security. Identity is the id handed out at construction,
/// so two stocks created from the same symbol are distinct holdings.
#[derive(Clone)]
pub struct Stock {
    id: u64,
    pub symbol: String,
    pub wkn: Option<String>,
    pub isin: Option<String>,
}

impl std::fmt::Debug for Stock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stock {{ id: {}, symbol: {} }}", self.id, self.symbol)
    }
}

impl PartialEq for Stock {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Stock {}

impl Hash for Stock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Stock {
    pub fn new(symbol: &str) -> Self {
        Self {
            id: NEXT_STOCK_ID.fetch_add(1, Ordering::Relaxed),
            symbol: symbol.to_string(),
            wkn: None,
            isin: None,
        }
    }

    pub fn with_identifiers(symbol: &str, wkn: Option<&str>, isin: Option<&str>) -> Self {
        Self {
            wkn: wkn.map(str::to_owned),
            isin: isin.map(str::to_owned),
            ..Self::new(symbol)
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}
