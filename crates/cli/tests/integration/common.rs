//! Shared test helpers for CLI integration tests.
//!
//! Every external tool the build drives is a small shell script in a private
//! `bin/` directory. PATH holds only that directory and a directory of
//! symlinked coreutils, so nothing installed on the host is ever picked up.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Coreutils the fake tools call.
const UTILS: [&str; 8] = ["mkdir", "cat", "chmod", "dirname", "basename", "sleep", "cp", "rm"];

pub const MANIFEST: &str = r#"{
  "version": 1,
  "main_template": "media-insights-stack.template",
  "units": [
    {
      "name": "media_insights_engine_lambda_helper",
      "kind": "plain-zip",
      "sources": ["source/lib/MediaInsightsEngineLambdaHelper"],
      "archive": "media_insights_engine_lambda_helper.zip"
    },
    { "name": "workflow", "kind": "plain-zip", "sources": ["source/workflow/app.py"], "archive": "workflow.zip" },
    {
      "name": "mediainfo",
      "group": "operators",
      "kind": "dependency-bundle",
      "sources": ["source/operators/mediainfo/mediainfo.py"],
      "dependencies": ["pymediainfo==4.2.1"],
      "archive": "mediainfo.zip"
    },
    {
      "name": "dataplaneapi",
      "kind": "framework-packaged",
      "sources": ["source/dataplaneapi"],
      "archive": "dataplaneapi.zip",
      "override_document": "source/dataplaneapi/external_resources.json",
      "template": "media-insights-dataplane-api-stack.template"
    }
  ],
  "templates": [
    { "source": "deployment/media-insights-stack.yaml", "destination": "media-insights-stack.template" }
  ],
  "environment": { "packages": ["wheel", "chalice==1.21.4"] }
}"#;

pub const EXPECTED_URL: &str =
  "https://tb.s3.us-east-1.amazonaws.com/media_insights_engine/v2.0.0/media-insights-stack.template";

/// A throwaway checkout of the solution plus the tools to build it.
pub struct Project {
  pub temp: TempDir,
  pub repo: PathBuf,
  pub bin: PathBuf,
  pub tmp: PathBuf,
  utils: PathBuf,
}

impl Project {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    let project = Self {
      repo: root.join("repo"),
      bin: root.join("bin"),
      tmp: root.join("tmp"),
      utils: root.join("utils"),
      temp,
    };
    fs::create_dir_all(&project.tmp).unwrap();
    project.link_utils();

    let files = [
      ("miepack.json", MANIFEST),
      ("source/lib/MediaInsightsEngineLambdaHelper/helper.py", "class Helper: pass\n"),
      ("source/workflow/app.py", "def handler(event, context): pass\n"),
      ("source/operators/mediainfo/mediainfo.py", "import pymediainfo\n"),
      ("source/dataplaneapi/app.py", "app = None\n"),
      ("source/dataplaneapi/external_resources.json", "{}\n"),
      (
        "deployment/media-insights-stack.yaml",
        "CodeBucket: %%BUCKET_NAME%%\nTemplateBucket: %%TEMPLATE_BUCKET_NAME%%\nVersion: %%VERSION%%\n",
      ),
    ];
    for (rel, content) in files {
      project.write_file(rel, content);
    }

    project.python(true);
    project.script("chalice", CHALICE);
    project
  }

  fn link_utils(&self) {
    fs::create_dir_all(&self.utils).unwrap();
    for name in UTILS {
      let found = ["/bin", "/usr/bin"]
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|p| p.exists());
      if let Some(real) = found {
        std::os::unix::fs::symlink(real, self.utils.join(name)).unwrap();
      }
    }
  }

  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.repo.join(relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }

  /// Install an executable script named `name` on the test PATH.
  pub fn script(&self, name: &str, body: &str) -> PathBuf {
    fs::create_dir_all(&self.bin).unwrap();
    let path = self.bin.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  /// A `python3` that creates venvs, with or without a working `pip`.
  pub fn python(&self, with_pip: bool) {
    let pip = if with_pip {
      format!("cat > \"$3/bin/pip\" <<'PIP'\n{}\nPIP\nchmod +x \"$3/bin/pip\"", PIP)
    } else {
      String::new()
    };
    self.script(
      "python3",
      &format!(
        "if [ \"$1\" = \"-m\" ] && [ \"$2\" = \"venv\" ]; then\n  mkdir -p \"$3/bin\"\n  {}\n  exit 0\nfi\nexit 64",
        pip
      ),
    );
  }

  /// A `python3` whose venv `pip` drops a fake `pytest` into the venv.
  ///
  /// The fake pytest exits with the code stored in `<repo>/pytest-exit`
  /// (0 when absent) and records its arguments in `<repo>/pytest-args`.
  pub fn pytest_python(&self) {
    self.script(
      "python3",
      r#"mkdir -p "$3/bin"
cat > "$3/bin/pip" <<'PIP'
#!/bin/sh
venv="$(dirname "$0")"
cat > "$venv/pytest" <<'PYTEST'
#!/bin/sh
echo "$*" > "$(pwd -P)/pytest-args"
exit "$(cat "$(pwd -P)/pytest-exit" 2>/dev/null || echo 0)"
PYTEST
chmod +x "$venv/pytest"
PIP
chmod +x "$3/bin/pip""#,
    );
  }

  pub fn staging(&self) -> PathBuf {
    self.repo.join("deployment/dist")
  }

  pub fn remote(&self) -> PathBuf {
    self.temp.path().join("remote")
  }

  /// Ephemeral environment directories left in the temp dir.
  pub fn env_dirs(&self) -> Vec<PathBuf> {
    fs::read_dir(&self.tmp)
      .unwrap()
      .map(|e| e.unwrap().path())
      .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("miepack-env-"))
      .collect()
  }

  pub fn path_var(&self) -> String {
    format!("{}:{}", self.bin.display(), self.utils.display())
  }

  pub fn miepack_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("miepack");
    self.apply_env(&mut cmd);
    cmd
  }

  pub fn apply_env(&self, cmd: &mut Command) {
    cmd
      .env("PATH", self.path_var())
      .env("TMPDIR", &self.tmp)
      .env("MIEPACK_REPO_ROOT", &self.repo)
      .env_remove("MIEPACK_STAGING_DIR")
      .env_remove("VIRTUAL_ENV")
      .env_remove("RUST_LOG");
  }

  /// `build` with the standard parameters, publishing through `aws`.
  pub fn remote_build_args(&self) -> Vec<String> {
    [
      "build",
      "--template-bucket",
      "tb",
      "--code-bucket",
      "cb",
      "--version",
      "v2.0.0",
      "--region",
      "us-east-1",
      "--manifest",
      "miepack.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
  }

  /// `build` with the standard parameters, publishing into [`Self::remote`].
  pub fn build_args(&self) -> Vec<String> {
    let mut args = self.remote_build_args();
    args.push("--local-store".to_string());
    args.push(self.remote().display().to_string());
    args
  }
}

const PIP: &str = r##"#!/bin/sh
target=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--target" ]; then target="$2"; shift; fi
  shift
done
if [ -n "$target" ]; then
  mkdir -p "$target/vendored"
  echo "# vendored" > "$target/vendored/__init__.py"
fi
exit 0"##;

const CHALICE: &str = r#"for last; do :; done
mkdir -p "$last"
printf 'PK-deployment' > "$last/deployment.zip"
echo '{"Parameters": {"Bucket": "%%BUCKET_NAME%%"}}' > "$last/sam.json""#;
