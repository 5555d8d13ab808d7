//! Test utilities for miepack-lib.
//!
//! Stand-ins for the external tools the build drives (python, pip, chalice,
//! aws, the layer factory script). Each one is a small `/bin/sh` script, so
//! these helpers are Unix-only.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::exec::ToolEnv;

/// Write an executable shell script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  fs::create_dir_all(dir).unwrap();
  let path = dir.join(name);
  fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// A `python3` that understands `-m venv DIR` and nothing else.
///
/// The created "venv" gets an empty `bin/`; when `with_pip` is set it also
/// gets a `pip` that records its arguments in `DIR/pip-args` and drops a
/// `vendored/__init__.py` into any `--target` directory.
pub fn fake_python(dir: &Path, with_pip: bool) -> PathBuf {
  let pip_setup = if with_pip {
    format!(
      r#"cat > "$3/bin/pip" <<'PIP'
{}
PIP
chmod +x "$3/bin/pip""#,
      fake_pip_body()
    )
  } else {
    String::new()
  };

  write_script(
    dir,
    "python3",
    &format!(
      r#"if [ "$1" = "-m" ] && [ "$2" = "venv" ]; then
  mkdir -p "$3/bin"
  {}
  exit 0
fi
exit 64"#,
      pip_setup
    ),
  )
}

/// Body of a fake `pip`: logs arguments and vendors a marker package.
pub fn fake_pip_body() -> &'static str {
  r##"#!/bin/sh
log="$(dirname "$0")/../pip-args"
printf '%s\n' "$@" >> "$log"
target=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--target" ]; then target="$2"; shift; fi
  shift
done
if [ -n "$target" ]; then
  mkdir -p "$target/vendored"
  echo "# vendored" > "$target/vendored/__init__.py"
fi
exit 0"##
}

/// A fake `pip` placed directly in `dir`.
pub fn fake_pip(dir: &Path, name: &str) -> PathBuf {
  let body = fake_pip_body().trim_start_matches("#!/bin/sh\n");
  write_script(dir, name, body)
}

/// A fake `chalice` that emits `deployment.zip` and `sam.json` into the
/// output directory given as its last argument.
pub fn fake_chalice(dir: &Path) -> PathBuf {
  write_script(
    dir,
    "chalice",
    r#"for last; do :; done
mkdir -p "$last"
printf 'PK-deployment-%s' "$(basename "$(pwd -P)")" > "$last/deployment.zip"
echo '{"Resources": {}}' > "$last/sam.json""#,
  )
}

/// Coreutils the fake scripts call.
const SCRIPT_UTILS: [&str; 9] = ["mkdir", "cat", "chmod", "dirname", "basename", "sleep", "touch", "cp", "rm"];

/// A tool env whose PATH holds `bin` plus a private directory of symlinked
/// coreutils, so real `pip`, `docker` or `aws` installs on the host are never
/// picked up.
pub fn isolated_env(bin: &Path) -> ToolEnv {
  let utils = bin.with_file_name(format!(
    "{}-utils",
    bin.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
  ));
  fs::create_dir_all(&utils).unwrap();
  for name in SCRIPT_UTILS {
    let link = utils.join(name);
    if link.exists() {
      continue;
    }
    if let Ok(real) = which::which(name) {
      std::os::unix::fs::symlink(real, link).unwrap();
    }
  }

  let path = format!("{}:{}", bin.display(), utils.display());
  ToolEnv::with_path(path).remove("VIRTUAL_ENV")
}
