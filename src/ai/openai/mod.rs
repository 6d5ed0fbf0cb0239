pub mod chat;
pub mod client;
pub mod image;
pub mod types;

pub use chat::OpenAiDescriptionClient;
pub use client::OpenAiHttpClient;
pub use image::OpenAiCoverImageClient;
