pub(crate) mod archive; // Tarball creation
pub(crate) mod db_dump; // External dump tool invocation
pub(crate) mod encrypt; // Archive encryption / decryption
pub(crate) mod logic; // Pipeline orchestration
pub(crate) mod naming; // Remote key layout
pub(crate) mod retention; // Expiry of old remote archives
pub(crate) mod s3_upload; // Object store access

pub use db_dump::MongoDump;
pub use encrypt::{Encryptor, OpenSslCipher};
pub use logic::{BackupMode, BackupPipeline, BackupRequest};
pub use s3_upload::S3Store;
