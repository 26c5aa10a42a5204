pub mod drive_client;
pub mod service_account;

pub use drive_client::{AccessTokenProvider, GoogleDriveClient};
pub use service_account::ServiceAccountAuth;
