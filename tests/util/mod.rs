use emprops::fleet::MemoryFleet;
use emprops::model::{Target, TargetProperty};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Deterministic fleet snapshot shared by the integration tests.
///
/// | guid | name                                | type            | agent  |
/// |------|-------------------------------------|-----------------|--------|
/// | G1   | db1                                 | oracle_database | agent1 |
/// | G2   | db2                                 | oracle_database | agent2 |
/// | G3   | agent1.example.com:3872             | oracle_emd      | agent1 |
/// | G4   | Management Services and Repository  | oracle_emrep    | none   |
/// | G5   | reject-me                           | oracle_database | agent2 |
#[derive(Debug, Clone)]
pub struct FleetFixture {
    pub targets: Vec<Target>,
    pub properties: Vec<TargetProperty>,
}

pub const AGENT1: &str = "https://agent1.example.com:3872/emd/main/";
pub const AGENT2: &str = "https://agent2.example.com:3872/emd/main/";

#[allow(dead_code)]
impl FleetFixture {
    pub fn standard() -> Self {
        Self {
            targets: vec![
                Target::new("G1", "db1", "oracle_database", Some(AGENT1)),
                Target::new("G2", "db2", "oracle_database", Some(AGENT2)),
                Target::new("G3", "agent1.example.com:3872", "oracle_emd", Some(AGENT1)),
                Target::new("G4", "Management Services and Repository", "oracle_emrep", None),
                Target::new("G5", "reject-me", "oracle_database", Some(AGENT2)),
            ],
            properties: vec![
                TargetProperty::new("G1", "orcl_gtp_location", "DC1"),
                TargetProperty::new("G1", "orcl_gtp_contact", "dba-team"),
                TargetProperty::new("G1", "Version", "19.0.0.0.0"),
                TargetProperty::new("G2", "orcl_gtp_location", "DC2"),
            ],
        }
    }

    /// Scenario from the pipeline contract: two databases on different agents.
    pub fn two_databases() -> Self {
        Self {
            targets: vec![
                Target::new("G1", "db1", "oracle_database", Some("https://agent1/em")),
                Target::new("G2", "db2", "oracle_database", Some("https://agent2/em")),
            ],
            properties: Vec::new(),
        }
    }

    pub fn memory_fleet(&self) -> MemoryFleet {
        MemoryFleet::new(self.targets.clone(), self.properties.clone())
    }

    /// `emcli list` style payloads (`{"data": [...]}`).
    pub fn targets_json(&self) -> String {
        json!({ "data": self.targets }).to_string()
    }

    pub fn properties_json(&self) -> String {
        json!({ "data": self.properties }).to_string()
    }

    /// `--fixture` file contents.
    pub fn fixture_json(&self) -> String {
        json!({ "targets": self.targets, "properties": self.properties }).to_string()
    }
}

const FAKE_EMCLI: &str = r#"#!/bin/sh
printf '%s %s %s\n' "$EMCLI_OUTPUT_TYPE" "$EMCLI_TRUSTALL" "$*" >> "$FAKE_EMCLI_DIR/calls.log"
case "$1" in
  login)
    IFS= read -r password
    printf '%s\n' "$password" > "$FAKE_EMCLI_DIR/login_stdin"
    echo "Login successful"
    ;;
  list)
    case "$2" in
      -resource=Targets) cat "$FAKE_EMCLI_DIR/targets.json" ;;
      -resource=TargetProperties) cat "$FAKE_EMCLI_DIR/properties.json" ;;
      *) echo "Unknown resource $2" >&2; exit 1 ;;
    esac
    ;;
  set_target_property_value)
    case "$*" in
      *reject-me*) echo "Target reject-me:oracle_database is in an invalid state" >&2; exit 1 ;;
    esac
    echo "Properties updated successfully"
    ;;
  *)
    echo "Unknown verb $1" >&2
    exit 2
    ;;
esac
"#;

/// A throwaway `emcli` shell script serving a [`FleetFixture`] and logging every call.
#[allow(dead_code)]
pub struct FakeEmcli {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl FakeEmcli {
    pub fn new(fixture: &FleetFixture) -> Self {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("targets.json"), fixture.targets_json()).unwrap();
        std::fs::write(dir.path().join("properties.json"), fixture.properties_json()).unwrap();

        let script = dir.path().join("emcli");
        std::fs::write(&script, FAKE_EMCLI).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn script(&self) -> PathBuf {
        self.dir.path().join("emcli")
    }

    /// Write a config file pointing at the script, with extra TOML appended.
    pub fn write_config(&self, extra: &str) -> PathBuf {
        let path = self.dir.path().join("config.toml");
        let content = format!(
            "[session]\nemcli = '{}'\ntrust_all = true\n{extra}",
            self.script().display()
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Every logged invocation as `<output type> <trust all> <args...>`.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// What the last `login` read from stdin, if it ran.
    pub fn login_stdin(&self) -> Option<String> {
        std::fs::read_to_string(self.dir.path().join("login_stdin")).ok()
    }

    pub fn set_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|line| line.contains(" set_target_property_value "))
            .collect()
    }
}
