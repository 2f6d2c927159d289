pub mod auth; // Credential loading and refresh
pub mod fetcher;
pub mod openai; // Vision analysis client
pub mod photos; // Google Photos Library search

pub use auth::{authenticate, AuthError, Credential, CredentialProvider, FileTokenStore};
pub use fetcher::{FetchError, HttpImageFetcher, ImageFetcher};
pub use openai::{OpenAiVisionClient, VisionService};
pub use photos::{MediaSource, PhotoLibraryClient, SearchError};
