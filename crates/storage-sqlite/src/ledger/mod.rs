mod repository;

pub use repository::SqliteTradeLedgerRepository;
