use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("livelab-render: Connection error : {}", message)]
    Connection { message: String },
    #[error("livelab-render: Scene rejected frame : {}", .0)]
    Rejected(String),
}
