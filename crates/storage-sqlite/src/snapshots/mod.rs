mod repository;

pub use repository::SqliteSnapshotRepository;
