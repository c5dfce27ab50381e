pub mod blame;
pub mod repository;

pub use blame::BlameProvider;
pub use repository::GitRepository;
