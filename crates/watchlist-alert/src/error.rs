use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("contact lookup failed: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("sms gateway rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}
