mod repository;

pub use repository::SqliteFxRepository;
