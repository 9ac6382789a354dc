mod repository;

pub use repository::SqliteSecurityRepository;
