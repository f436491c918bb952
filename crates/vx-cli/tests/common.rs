#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub const MARKER: &str = "__vx-relaunch__";

/// Hermetic fixture: a scratch directory holding the stub toolchain, the
/// environments root, and the scripts under test. Nothing touches the real
/// home directory or a real Python installation.
pub struct Sandbox {
    _temp: TempDir,
    pub dir: PathBuf,
    pub envs_root: PathBuf,
    pub python: PathBuf,
}

pub fn sandbox() -> Sandbox {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_path_buf();
    let python = write_stub_python(&dir);
    let envs_root = dir.join("envs");
    Sandbox {
        _temp: temp,
        dir,
        envs_root,
        python,
    }
}

impl Sandbox {
    pub fn vx(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("vx");
        cmd.current_dir(&self.dir)
            .env("VX_ENVS_DIR", &self.envs_root)
            .env("VX_PYTHON", &self.python)
            .env("NO_COLOR", "1")
            .env_remove("VX_TEST_PIP_FAIL")
            .env_remove("VIRTUAL_ENV");
        cmd
    }

    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.join(name);
        fs::write(&path, body).expect("write script");
        path
    }

    /// The single environment directory created so far.
    pub fn single_env_dir(&self) -> PathBuf {
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.envs_root)
            .expect("read envs root")
            .flatten()
            .map(|entry| entry.path())
            .collect();
        assert_eq!(dirs.len(), 1, "expected exactly one environment: {dirs:?}");
        dirs.remove(0)
    }

    pub fn env_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.envs_root)
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn pip_log(&self, env_dir: &Path) -> Vec<String> {
        fs::read_to_string(env_dir.join("pip.log"))
            .map(|text| text.lines().map(ToOwned::to_owned).collect())
            .unwrap_or_default()
    }
}

/// Shell stand-in for `python3`. `-m venv <dir>` builds a minimal
/// environment: `python`/`python3` stubs that hand the script to `/bin/sh`,
/// and a `pip` stub that logs its arguments to `<env>/pip.log` (failing when
/// `VX_TEST_PIP_FAIL` is set). Test scripts are therefore plain shell.
pub fn write_stub_python(dir: &Path) -> PathBuf {
    let stub = dir.join("python3");
    let script = r#"#!/bin/sh
if [ "$1" = "-m" ] && [ "$2" = "venv" ]; then
  env_dir="$3"
  mkdir -p "$env_dir/bin" || exit 1
  printf '#!/bin/sh\nexec /bin/sh "$@"\n' > "$env_dir/bin/python"
  cp "$env_dir/bin/python" "$env_dir/bin/python3"
  cat > "$env_dir/bin/pip" <<'PIP'
#!/bin/sh
echo "$@" >> "$(dirname "$0")/../pip.log"
if [ -n "$VX_TEST_PIP_FAIL" ]; then
  echo "ERROR: simulated install failure" >&2
  exit 1
fi
exit 0
PIP
  chmod +x "$env_dir/bin/python" "$env_dir/bin/python3" "$env_dir/bin/pip"
  exit 0
fi
exit 0
"#;
    fs::write(&stub, script).expect("write stub python");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&stub, fs::Permissions::from_mode(0o755)).expect("chmod stub");
    }
    stub
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

pub fn stdout_of(assert: &Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).to_string()
}

pub fn stderr_of(assert: &Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).to_string()
}
