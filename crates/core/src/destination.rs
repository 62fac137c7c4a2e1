//! Destination writer.
//!
//! Hides whether formatted bytes go to standard output or to a named file.
//! The destination is resolved once per top-level invocation and passed
//! explicitly; there is no process-wide "current destination".
//!
//! File destinations are written through a temporary file in the target's
//! directory that replaces the target only in [`DestinationWriter::finish`],
//! so a failed invocation never leaves truncated output behind.

use crate::error::{BridgeError, FormatFailure};
use crate::token::Token;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Where formatted output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
}

impl Destination {
    /// An absent path is standard output; a present path is always that file.
    pub fn from_path<P: Into<PathBuf>>(path: Option<P>) -> Self {
        match path {
            Some(p) => Self::File(p.into()),
            None => Self::Stdout,
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Stdout => "<stdout>".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Open a writer for this destination.
    pub fn open(&self) -> Result<DestinationWriter, BridgeError> {
        let sink = match self {
            Self::Stdout => Sink::Stdout(TokenWriter::new(io::stdout().lock())),
            Self::File(path) => open_file(path)?,
        };
        tracing::debug!(target_name = %self.describe(), "opened destination");
        Ok(DestinationWriter {
            target: self.describe(),
            sink,
        })
    }
}

fn open_file(path: &Path) -> Result<Sink, BridgeError> {
    let target = path.display().to_string();
    if path.file_name().is_none() {
        return Err(BridgeError::BadFileName(target));
    }
    if path.is_dir() {
        return Err(BridgeError::DestinationOpen {
            target,
            source: io::Error::other("destination is a directory"),
        });
    }

    // Write through symlinks onto the file they name
    let path = match fs::canonicalize(path) {
        Ok(real) => real,
        Err(_) => path.to_path_buf(),
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = tempfile::Builder::new()
        .prefix(".fmtbridge-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|source| BridgeError::DestinationOpen {
            target: target.clone(),
            source,
        })?;

    // Replacing a file keeps its mode; new files get the usual 0644
    let permissions = match fs::metadata(&path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => default_permissions(),
    };
    if let Some(permissions) = permissions {
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|source| BridgeError::DestinationOpen {
                target: target.clone(),
                source,
            })?;
    }

    Ok(Sink::File {
        writer: TokenWriter::new(BufWriter::new(tmp)),
        path,
    })
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}

/// Writes bytes and tokens to any [`Write`] in arrival order, counting what
/// went through.
///
/// Tokens are pulled one at a time and written before the next one is
/// requested, so memory use does not depend on the size of the output.
#[derive(Debug)]
pub struct TokenWriter<W: Write> {
    inner: W,
    bytes: u64,
    tokens: u64,
}

impl<W: Write> TokenWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes: 0,
            tokens: 0,
        }
    }

    /// Write a whole buffer (one-shot emission).
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.bytes += bytes.len() as u64;
        Ok(())
    }

    pub fn write_token(&mut self, token: &Token<'_>) -> io::Result<()> {
        self.write(token.as_bytes())?;
        self.tokens += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    #[must_use]
    pub fn tokens_written(&self) -> u64 {
        self.tokens
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[derive(Debug)]
enum Sink {
    Stdout(TokenWriter<io::StdoutLock<'static>>),
    File {
        writer: TokenWriter<BufWriter<NamedTempFile>>,
        path: PathBuf,
    },
}

/// An open destination.
///
/// Dropping a file writer without calling [`finish`](Self::finish) discards
/// everything written so far and leaves the target untouched.
#[derive(Debug)]
pub struct DestinationWriter {
    target: String,
    sink: Sink,
}

impl DestinationWriter {
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        match &self.sink {
            Sink::Stdout(w) => w.bytes_written(),
            Sink::File { writer, .. } => writer.bytes_written(),
        }
    }

    /// Write bytes now.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        let res = match &mut self.sink {
            Sink::Stdout(w) => w.write(bytes),
            Sink::File { writer, .. } => writer.write(bytes),
        };
        res.map_err(|source| self.write_error(source))
    }

    fn write_token(&mut self, token: &Token<'_>) -> Result<(), BridgeError> {
        let res = match &mut self.sink {
            Sink::Stdout(w) => w.write_token(token),
            Sink::File { writer, .. } => writer.write_token(token),
        };
        res.map_err(|source| self.write_error(source))
    }

    /// Emit tokens in order, one at a time. Returns the number of tokens.
    pub fn write_tokens<'t, I>(&mut self, tokens: I) -> Result<u64, BridgeError>
    where
        I: IntoIterator<Item = Token<'t>>,
    {
        self.try_write_tokens(tokens.into_iter().map(Ok))
    }

    /// Emit tokens from a source that can fail part way.
    ///
    /// On failure the error is returned immediately; for file destinations
    /// nothing reaches the target because the writer is never finished.
    /// Tokens already written to standard output stay there.
    pub fn try_write_tokens<'t, I>(&mut self, tokens: I) -> Result<u64, BridgeError>
    where
        I: IntoIterator<Item = Result<Token<'t>, FormatFailure>>,
    {
        let mut count = 0;
        for token in tokens {
            self.write_token(&token?)?;
            count += 1;
        }
        tracing::trace!(tokens = count, target_name = %self.target, "emitted tokens");
        Ok(count)
    }

    /// Flush and close the destination. For files this syncs the data and
    /// moves it onto the target path. Returns the total bytes written.
    pub fn finish(self) -> Result<u64, BridgeError> {
        let target = self.target;
        let write_error = |source| BridgeError::DestinationWrite {
            target: target.clone(),
            source,
        };

        let bytes = match self.sink {
            Sink::Stdout(mut w) => {
                w.flush().map_err(write_error)?;
                w.bytes_written()
            }
            Sink::File { writer, path } => {
                let bytes = writer.bytes_written();
                let tmp = writer
                    .into_inner()
                    .into_inner()
                    .map_err(|e| write_error(e.into_error()))?;
                tmp.as_file().sync_all().map_err(write_error)?;
                tmp.persist(&path).map_err(|e| write_error(e.error))?;
                bytes
            }
        };

        tracing::debug!(bytes, target_name = %target, "destination finished");
        Ok(bytes)
    }

    fn write_error(&self, source: io::Error) -> BridgeError {
        BridgeError::DestinationWrite {
            target: self.target.clone(),
            source,
        }
    }
}

/// Stream tokens to `path`, or to standard output when `path` is absent.
///
/// Returns the number of bytes written.
pub fn write_intermediary<'t, I>(path: Option<&Path>, tokens: I) -> Result<u64, BridgeError>
where
    I: IntoIterator<Item = Token<'t>>,
{
    try_write_intermediary(path, tokens.into_iter().map(Ok))
}

/// Like [`write_intermediary`] for token sources that can fail.
pub fn try_write_intermediary<'t, I>(path: Option<&Path>, tokens: I) -> Result<u64, BridgeError>
where
    I: IntoIterator<Item = Result<Token<'t>, FormatFailure>>,
{
    let mut writer = Destination::from_path(path).open()?;
    writer.try_write_tokens(tokens)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_absent_path_is_stdout() {
        assert_eq!(Destination::from_path(None::<&Path>), Destination::Stdout);
        assert_eq!(
            Destination::from_path(Some("out.rb")),
            Destination::File(PathBuf::from("out.rb"))
        );
    }

    #[test]
    fn test_token_writer_preserves_order() {
        let mut writer = TokenWriter::new(Vec::new());
        for t in ["t1", "t2", "t3"] {
            writer.write_token(&Token::from(t)).unwrap();
        }
        assert_eq!(writer.tokens_written(), 3);
        assert_eq!(writer.bytes_written(), 6);
        assert_eq!(writer.into_inner(), b"t1t2t3".to_vec());
    }

    #[test]
    fn test_file_destination_writes_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.rb");

        let mut writer = Destination::File(path.clone()).open().unwrap();
        writer.write(b"x = 1\n").unwrap();
        assert!(!path.exists(), "target must not appear before finish");

        assert_eq!(writer.finish().unwrap(), 6);
        assert_eq!(fs::read(&path).unwrap(), b"x = 1\n");
    }

    #[test]
    fn test_file_destination_truncates_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.rb");
        fs::write(&path, "a much longer previous content\n").unwrap();

        write_intermediary(Some(path.as_path()), [Token::from("y")]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "y");
    }

    #[test]
    fn test_dropped_writer_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.rb");

        let mut writer = Destination::File(path.clone()).open().unwrap();
        writer.write(b"partial").unwrap();
        drop(writer);

        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_parent_directory_is_destination_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.rb");

        let err = Destination::File(path.clone()).open().unwrap_err();
        assert!(err.is_destination_failure());
        assert!(matches!(err, BridgeError::DestinationOpen { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_directory_target_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Destination::File(dir.path().to_path_buf())
            .open()
            .unwrap_err();
        assert!(err.is_destination_failure());
    }

    #[test]
    fn test_failing_token_source_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.rb");

        let tokens = vec![
            Ok(Token::from("a")),
            Err(FormatFailure::Engine("host callback failed".into())),
            Ok(Token::from("b")),
        ];
        let err = try_write_intermediary(Some(path.as_path()), tokens).unwrap_err();
        assert!(matches!(err, BridgeError::Format(FormatFailure::Engine(_))));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_target_is_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.rb");
        let link = dir.path().join("link.rb");
        fs::write(&real, "old\n").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        write_intermediary(Some(link.as_path()), [Token::from("new\n")]).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "new\n");
        assert_eq!(fs::read_to_string(&link).unwrap(), "new\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_permissions_are_kept() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.rb");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        write_intermediary(Some(path.as_path()), [Token::from("new")]).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
