//! Startup scripts and file-backed payloads passed through instance metadata.
//!
//! Scripts can be bundled, given inline, or read from a file. Files are read
//! through `cap-std` after `~/` expansion so CLI and configuration paths
//! behave the same way.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use shell_escape::unix::escape;
use thiserror::Error;

/// Directory the bundled web app is installed into.
pub const APP_DIR: &str = "/opt/flask_app/flask-tutorial";

/// Repository cloned by the bundled web-app script.
pub const APP_REPOSITORY: &str = "https://github.com/cu-csci-4253-datacenter/flask-tutorial";

/// Metadata key carrying the launcher payload.
pub const PAYLOAD_KEY: &str = "launch-payload";

/// Metadata key carrying service account credentials.
pub const CREDENTIALS_KEY: &str = "service-credentials";

/// Metadata key carrying the project identifier.
pub const PROJECT_KEY: &str = "project";

/// Metadata key carrying the zone.
pub const ZONE_KEY: &str = "zone";

/// Default working directory on the launcher VM.
pub const DEFAULT_LAUNCHER_DIR: &str = "/srv";

const METADATA_ATTRIBUTES_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/attributes";

/// Errors raised while resolving scripts and payload files.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ScriptError {
    /// Raised when both inline and file sources are provided.
    #[error("startup script cannot be provided both inline and via file")]
    BothProvided,
    /// Raised when an inline script is empty or only whitespace.
    #[error("startup script must not be empty")]
    InlineEmpty,
    /// Raised when a file path is empty or only whitespace.
    #[error("file path must not be empty")]
    FilePathEmpty,
    /// Raised when a file resolves to empty or only whitespace.
    #[error("file `{path}` must not be empty")]
    FileEmpty {
        /// Expanded path of the empty file.
        path: String,
    },
    /// Raised when reading a file fails.
    #[error("failed to read `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Script that installs and starts the web app on a fresh VM.
#[must_use]
pub fn web_app_script(port: u16) -> String {
    format!(
        "#!/bin/bash
sudo apt-get update
sudo apt-get install -y python3 python3-pip git
mkdir -p /opt/flask_app
cd /opt/flask_app
git clone {APP_REPOSITORY}
cd flask-tutorial
sudo python3 setup.py install
sudo pip3 install -e .
export FLASK_APP=flaskr
flask init-db
nohup flask run -h 0.0.0.0 -p {port} &
"
    )
}

/// Script that restarts the already installed web app on a cloned VM.
#[must_use]
pub fn clone_restart_script(port: u16) -> String {
    format!(
        "#!/bin/bash
cd {APP_DIR}
export FLASK_APP=flaskr
flask init-db
nohup flask run -h 0.0.0.0 -p {port} &
"
    )
}

/// Renders the launcher VM's startup script.
///
/// The script downloads the payload (and credentials, when configured) from
/// the metadata server into the working directory, exports the project and
/// zone, and runs the payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LauncherScript {
    work_dir: String,
    interpreter: Vec<String>,
    with_credentials: bool,
}

impl Default for LauncherScript {
    fn default() -> Self {
        Self {
            work_dir: DEFAULT_LAUNCHER_DIR.to_owned(),
            interpreter: Vec::new(),
            with_credentials: false,
        }
    }
}

impl LauncherScript {
    /// Creates a script that executes the payload directly from `/srv`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the payload through an interpreter command such as `python3`.
    #[must_use]
    pub fn interpreter(mut self, command: &str) -> Self {
        self.interpreter = command.split_whitespace().map(str::to_owned).collect();
        self
    }

    /// Downloads credentials and exports `GOOGLE_APPLICATION_CREDENTIALS`.
    #[must_use]
    pub const fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = enabled;
        self
    }

    /// Produces the script text.
    #[must_use]
    pub fn render(&self) -> String {
        let dir = escape(self.work_dir.as_str().into());
        let payload = escape(format!("{}/{PAYLOAD_KEY}", self.work_dir).into());
        let credentials = escape(format!("{}/{CREDENTIALS_KEY}.json", self.work_dir).into());

        let mut script = String::from("#!/bin/bash\nset -euo pipefail\n");
        script.push_str(&format!("mkdir -p {dir}\ncd {dir}\n"));
        script.push_str(&format!(
            "fetch() {{ curl -sf \"{METADATA_ATTRIBUTES_URL}/$1\" -H \"Metadata-Flavor: Google\"; }}\n"
        ));
        script.push_str(&format!("fetch {PAYLOAD_KEY} > {payload}\nchmod +x {payload}\n"));
        if self.with_credentials {
            script.push_str(&format!(
                "fetch {CREDENTIALS_KEY} > {credentials}\nchmod 600 {credentials}\n\
                 export GOOGLE_APPLICATION_CREDENTIALS={credentials}\n"
            ));
        }
        script.push_str(&format!(
            "export GOOGLE_CLOUD_PROJECT=\"$(fetch {PROJECT_KEY})\"\n\
             export GOOGLE_CLOUD_ZONE=\"$(fetch {ZONE_KEY})\"\n"
        ));

        let mut command: Vec<String> = self
            .interpreter
            .iter()
            .map(|part| escape(part.as_str().into()).into_owned())
            .collect();
        command.push(payload.into_owned());
        script.push_str(&command.join(" "));
        script.push('\n');
        script
    }
}

/// Resolves a startup script from either an inline value or a file.
///
/// Inline and file sources are mutually exclusive. Both values are trimmed for
/// emptiness checks, but the returned script preserves the original content.
///
/// # Errors
///
/// Returns [`ScriptError`] when the inputs are invalid or the file cannot be
/// read.
pub fn resolve_script(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, ScriptError> {
    if inline.is_some() && file.is_some() {
        return Err(ScriptError::BothProvided);
    }

    if let Some(script) = inline {
        if script.trim().is_empty() {
            return Err(ScriptError::InlineEmpty);
        }
        return Ok(Some(script.to_owned()));
    }

    file.map(read_file).transpose()
}

/// Reads a non-empty text file, expanding a leading `~/`.
///
/// # Errors
///
/// Returns [`ScriptError`] when the path is blank, the file cannot be read, or
/// it holds only whitespace.
pub fn read_file(path: &str) -> Result<String, ScriptError> {
    if path.trim().is_empty() {
        return Err(ScriptError::FilePathEmpty);
    }

    let expanded = expand_tilde(path);
    let content = read_to_string_ambient(&expanded).map_err(|message| ScriptError::FileRead {
        path: expanded.clone(),
        message,
    })?;

    if content.trim().is_empty() {
        return Err(ScriptError::FileEmpty { path: expanded });
    }
    Ok(content)
}

/// Expands a leading `~/` to the current user's home directory.
///
/// # Examples
///
/// ```
/// # use snapfleet::startup::expand_tilde;
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}
