pub mod lance;

pub use lance::LanceVectorStore;
