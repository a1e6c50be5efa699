//! `sftp -b` batch files
//!
//! A batch file holds a single command line (`put`, `get`, `rm` or `ls`), UTF-8, without a
//! trailing newline. It lives in the scratch directory under a unique name for exactly one
//! session and is removed when the [`BatchFile`] is dropped or explicitly removed.

use std::io::Write;

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCommand {
    Put {
        local: std::path::PathBuf,
        remote: std::path::PathBuf,
    },
    Get {
        remote: std::path::PathBuf,
        local: std::path::PathBuf,
    },
    Rm {
        remote: std::path::PathBuf,
    },
    Ls {
        dir: std::path::PathBuf,
    },
}

impl BatchCommand {
    /// Render the command line, quoting arguments where sftp would split them
    pub fn to_line(&self) -> Result<String, Error> {
        Ok(match self {
            BatchCommand::Put { local, remote } => {
                format!("put {} {}", quote(local)?, quote(remote)?)
            }
            BatchCommand::Get { remote, local } => {
                format!("get {} {}", quote(remote)?, quote(local)?)
            }
            BatchCommand::Rm { remote } => format!("rm {}", quote(remote)?),
            BatchCommand::Ls { dir } => format!("ls {}", quote(dir)?),
        })
    }
}

/// Render one batch argument
///
/// `sftp` globs the source of `put`/`get` and the argument of `rm`/`ls`, and undoes the glob
/// escapes of a `put`/`get` destination. Escaping `*?[]` with a backslash therefore makes every
/// argument match exactly one file. Inside double quotes `\\` stands for one backslash, so a
/// literal backslash is written twice over to survive both the quoting and the glob.
fn quote(path: &std::path::Path) -> Result<String, Error> {
    let text = path
        .to_str()
        .filter(|text| !text.contains(['\n', '\r']))
        .ok_or_else(|| Error::UnsupportedPath(path.to_path_buf()))?;
    if !text.is_empty()
        && !text.chars().any(|c| {
            c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '#' | '*' | '?' | '[' | ']')
        })
    {
        return Ok(text.to_string());
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' | '*' | '?' | '[' | ']' => quoted.push('\\'),
            '\\' => quoted.push_str("\\\\\\"),
            _ => {}
        }
        quoted.push(c);
    }
    quoted.push('"');
    Ok(quoted)
}

/// Scratch file holding one batch command
#[derive(Debug)]
pub struct BatchFile {
    file: tempfile::NamedTempFile,
    line: String,
}

impl BatchFile {
    /// Create a uniquely named batch file in `scratch_dir` and write `command` to it
    ///
    /// Nothing is left behind when this fails part way.
    pub fn create(scratch_dir: &std::path::Path, command: &BatchCommand) -> Result<Self, Error> {
        let line = command.to_line()?;
        let mut file = tempfile::Builder::new()
            .prefix("rxtx-")
            .suffix(".batch")
            .tempfile_in(scratch_dir)
            .map_err(|source| Error::BatchCreate {
                dir: scratch_dir.to_path_buf(),
                source,
            })?;
        let written = file
            .write_all(line.as_bytes())
            .and_then(|()| file.as_file().sync_all());
        if let Err(source) = written {
            return Err(Error::BatchWrite {
                path: file.path().to_path_buf(),
                source,
            });
        }
        Ok(Self { file, line })
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    #[must_use]
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Delete the file, logging (not returning) a failure so that it is never silent
    pub fn remove(self) {
        let path = self.file.path().to_path_buf();
        if let Err(error) = self.file.close() {
            tracing::error!("Could not remove temporary file {:?}: {}", path, error);
        }
    }
}
