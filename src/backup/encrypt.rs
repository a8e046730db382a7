// dumpvault/src/backup/encrypt.rs
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use super::archive::ARCHIVE_EXTENSION;
use crate::errors::{BackupError, Result};
use crate::utils::{find_executable, validate_file};

const OPENSSL: &str = "openssl";
const PASSPHRASE_ENV: &str = "DUMPVAULT_CIPHER_PASSPHRASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Symmetric file cipher keyed by a passphrase.
pub trait Cipher {
    fn apply(
        &self,
        direction: Direction,
        input: &Path,
        output: &Path,
        passphrase: &str,
    ) -> Result<()>;
}

/// `openssl aes-128-cbc -salt`, compatible with archives produced by `openssl enc -k`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSslCipher;

impl Cipher for OpenSslCipher {
    fn apply(
        &self,
        direction: Direction,
        input: &Path,
        output: &Path,
        passphrase: &str,
    ) -> Result<()> {
        let openssl_path = find_executable(OPENSSL)?;
        let result = Command::new(openssl_path)
            .args(openssl_args(direction, input, output))
            .env(PASSPHRASE_ENV, passphrase)
            .output()?;

        if !result.status.success() {
            return Err(BackupError::tool_failed(
                OPENSSL,
                result.status,
                &result.stderr,
            ));
        }
        Ok(())
    }
}

/// The passphrase is read from the child's environment so it never shows up in `ps`.
pub fn openssl_args(direction: Direction, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["aes-128-cbc".into()];
    if direction == Direction::Decrypt {
        args.push("-d".into());
    }
    args.push("-salt".into());
    args.push("-in".into());
    args.push(input.as_os_str().to_owned());
    args.push("-out".into());
    args.push(output.as_os_str().to_owned());
    args.push("-pass".into());
    args.push(format!("env:{}", PASSPHRASE_ENV).into());
    args
}

/// Wraps and unwraps archives, falling back to the configured passphrase.
pub struct Encryptor<C> {
    cipher: C,
    default_passphrase: Option<String>,
}

impl<C: Cipher> Encryptor<C> {
    pub fn new(cipher: C, default_passphrase: Option<String>) -> Self {
        Encryptor {
            cipher,
            default_passphrase,
        }
    }

    fn passphrase<'a>(&'a self, explicit: Option<&'a str>) -> Result<&'a str> {
        explicit
            .filter(|p| !p.is_empty())
            .or(self.default_passphrase.as_deref())
            .ok_or(BackupError::missing("passphrase"))
    }

    /// Encrypts `input` into `output` and removes `input` on success.
    ///
    /// On failure `input` is kept and any partial `output` is removed.
    pub fn encrypt(&self, input: &Path, output: &Path, passphrase: Option<&str>) -> Result<()> {
        let passphrase = self.passphrase(passphrase)?;
        validate_file(input)?;

        info!(input = %input.display(), output = %output.display(), "Encrypting archive");
        if let Err(e) = self
            .cipher
            .apply(Direction::Encrypt, input, output, passphrase)
        {
            discard_partial(output);
            return Err(e);
        }

        fs::remove_file(input)?;
        info!(output = %output.display(), "✓ Archive encrypted");
        Ok(())
    }

    /// Decrypts `input` into `<input>.tar.gz`, keeping the encrypted file.
    pub fn decrypt(&self, input: &Path, passphrase: Option<&str>) -> Result<PathBuf> {
        validate_file(input)?;
        let passphrase = self.passphrase(passphrase)?;
        let output = decrypted_path(input);

        info!(input = %input.display(), output = %output.display(), "Decrypting archive");
        if let Err(e) = self
            .cipher
            .apply(Direction::Decrypt, input, &output, passphrase)
        {
            discard_partial(&output);
            return Err(e);
        }

        info!(output = %output.display(), "✓ Archive decrypted");
        Ok(output)
    }
}

pub fn decrypted_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(ARCHIVE_EXTENSION);
    PathBuf::from(name)
}

fn discard_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), "Failed to remove partial cipher output: {e}");
        }
    }
}
