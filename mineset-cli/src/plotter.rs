use async_trait::async_trait;
use mineset_core::{CoreError, Plot, PlotEngine, ProgressCallback, Prolog, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PlotterConfig;

/// Plot engine delegating nonce generation to an external program.
///
/// The program receives the plot parameters as arguments and reports progress by
/// printing percentages on stdout, one per line. Once it succeeds a manifest with
/// the requested prolog is written next to the plot, so the plot can be checked
/// against its miner later.
pub struct ExternalPlotter {
    config: PlotterConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    chain_id: String,
    public_key_for_signing_blocks_base58: String,
    signature_for_blocks: String,
    public_key_for_signing_deadlines_base58: String,
    signature_for_deadlines: String,
    extra_base58: String,
    start: u64,
    length: u64,
    hashing: String,
}

impl Manifest {
    fn new(prolog: &Prolog, start: u64, length: u64, hashing: &str) -> Self {
        Self {
            chain_id: prolog.chain_id.clone(),
            public_key_for_signing_blocks_base58: bs58::encode(&prolog.public_key_for_signing_blocks).into_string(),
            signature_for_blocks: prolog.signature_for_blocks.clone(),
            public_key_for_signing_deadlines_base58: bs58::encode(&prolog.public_key_for_signing_deadlines)
                .into_string(),
            signature_for_deadlines: prolog.signature_for_deadlines.clone(),
            extra_base58: bs58::encode(&prolog.extra).into_string(),
            start,
            length,
            hashing: hashing.to_string(),
        }
    }

    fn into_plot(self) -> Result<ExternalPlot> {
        let decode = |text: &str| {
            bs58::decode(text)
                .into_vec()
                .map_err(|e| CoreError::Plot(format!("corrupt manifest key {}: {}", text, e)))
        };

        Ok(ExternalPlot {
            prolog: Prolog {
                public_key_for_signing_blocks: decode(&self.public_key_for_signing_blocks_base58)?,
                public_key_for_signing_deadlines: decode(&self.public_key_for_signing_deadlines_base58)?,
                extra: decode(&self.extra_base58)?,
                chain_id: self.chain_id,
                signature_for_blocks: self.signature_for_blocks,
                signature_for_deadlines: self.signature_for_deadlines,
            },
            start: self.start,
            length: self.length,
            hashing: self.hashing,
        })
    }
}

struct ExternalPlot {
    prolog: Prolog,
    start: u64,
    length: u64,
    hashing: String,
}

impl Plot for ExternalPlot {
    fn prolog(&self) -> &Prolog {
        &self.prolog
    }

    fn start(&self) -> u64 {
        self.start
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn hashing(&self) -> &str {
        &self.hashing
    }
}

/// Location of the manifest of the plot at `path`
pub fn manifest_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".json");
    path.with_file_name(name)
}

/// Accepts `42`, `42%` and `progress 42`
fn parse_progress(line: &str) -> Option<u8> {
    let line = line.trim();
    let value = line.strip_prefix("progress").unwrap_or(line).trim();
    let value = value.strip_suffix('%').unwrap_or(value).trim();
    value.parse::<u8>().ok().filter(|percent| *percent <= 100)
}

impl ExternalPlotter {
    pub fn new(config: PlotterConfig) -> Self {
        Self { config }
    }

    fn command(&self, path: &Path, prolog: &Prolog, start: u64, length: u64, hashing: &str) -> Command {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .arg("--output")
            .arg(path)
            .arg("--chain-id")
            .arg(&prolog.chain_id)
            .arg("--key-blocks")
            .arg(bs58::encode(&prolog.public_key_for_signing_blocks).into_string())
            .arg("--signature-blocks")
            .arg(&prolog.signature_for_blocks)
            .arg("--key-deadlines")
            .arg(bs58::encode(&prolog.public_key_for_signing_deadlines).into_string())
            .arg("--signature-deadlines")
            .arg(&prolog.signature_for_deadlines)
            .arg("--start")
            .arg(start.to_string())
            .arg("--length")
            .arg(length.to_string())
            .arg("--hashing")
            .arg(hashing)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl PlotEngine for ExternalPlotter {
    async fn create(
        &self,
        path: &Path,
        prolog: &Prolog,
        start: u64,
        length: u64,
        hashing: &str,
        on_progress: ProgressCallback,
    ) -> Result<()> {
        info!("Running {} for {}", self.config.command, path.display());

        let mut child = self
            .command(path, prolog, start, length, hashing)
            .spawn()
            .map_err(|e| CoreError::Plot(format!("cannot start {}: {}", self.config.command, e)))?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut last = None;
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| CoreError::Plot(format!("cannot read plotter output: {}", e)))?
            {
                match parse_progress(&line) {
                    Some(percent) if last != Some(percent) => {
                        last = Some(percent);
                        on_progress(percent);
                    }
                    Some(_) => {}
                    None => debug!("plotter: {}", line),
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| CoreError::Plot(format!("plotter did not finish: {}", e)))?;
        if !status.success() {
            return Err(CoreError::Plot(format!("{} exited with {}", self.config.command, status)));
        }

        let manifest = serde_json::to_vec_pretty(&Manifest::new(prolog, start, length, hashing))?;
        tokio::fs::write(manifest_path(path), manifest)
            .await
            .map_err(|e| CoreError::Plot(format!("cannot write plot manifest: {}", e)))?;
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Box<dyn Plot>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(CoreError::Plot(format!("no plot at {}", path.display())));
        }

        let contents = tokio::fs::read(manifest_path(path))
            .await
            .map_err(|e| CoreError::Plot(format!("cannot read manifest of {}: {}", path.display(), e)))?;
        let manifest: Manifest = serde_json::from_slice(&contents)?;
        Ok(Box::new(manifest.into_plot()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn prolog() -> Prolog {
        Prolog {
            chain_id: "testnet".to_string(),
            public_key_for_signing_blocks: vec![1; 32],
            signature_for_blocks: "ed25519".to_string(),
            public_key_for_signing_deadlines: vec![2; 32],
            signature_for_deadlines: "ed25519".to_string(),
            extra: Vec::new(),
        }
    }

    fn shell(script: &str) -> ExternalPlotter {
        ExternalPlotter::new(PlotterConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "plotter".to_string()],
        })
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("42"), Some(42));
        assert_eq!(parse_progress(" 100% "), Some(100));
        assert_eq!(parse_progress("progress 7"), Some(7));
        assert_eq!(parse_progress("progress 101"), None);
        assert_eq!(parse_progress("writing nonces"), None);
    }

    #[test]
    fn test_manifest_path() {
        assert_eq!(
            manifest_path(Path::new("/plots/abc.plot")),
            PathBuf::from("/plots/abc.plot.json")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner.plot");
        let plotter = shell(r#"echo 10; echo 10; echo "progress 60"; echo 100; : > "$2""#);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        plotter
            .create(&path, &prolog(), 0, 500, "shabal256", Box::new(move |p| sink.lock().unwrap().push(p)))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![10, 60, 100]);

        let plot = plotter.load(&path).await.unwrap();
        assert_eq!(plot.prolog(), &prolog());
        assert_eq!(plot.length(), 500);
        assert_eq!(plot.hashing(), "shabal256");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_plotter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner.plot");
        let plotter = shell("echo 5; exit 3");

        let result = plotter.create(&path, &prolog(), 0, 500, "shabal256", Box::new(|_| {})).await;

        assert!(matches!(result, Err(CoreError::Plot(_))));
        assert!(!manifest_path(&path).exists());
    }

    #[tokio::test]
    async fn test_load_without_plot() {
        let dir = tempfile::tempdir().unwrap();
        let plotter = shell("true");
        assert!(plotter.load(&dir.path().join("missing.plot")).await.is_err());
    }
}
