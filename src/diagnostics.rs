//! GPU availability report: what libtorch sees plus what `nvidia-smi` says.
//! The subprocess is optional; a missing, failing or slow binary only degrades
//! the report.

use std::{fmt, path::Path, process::Stdio, time::Duration};

use tokio::{process::Command, time::timeout};
use tracing::debug;

pub const SMI_QUERY_ARGS: [&str; 2] = [
    "--query-gpu=name,driver_version,compute_cap",
    "--format=csv,noheader,nounits",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmiDevice {
    pub name: String,
    pub driver_version: String,
    pub compute_capability: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmiReport {
    Devices(Vec<SmiDevice>),
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct GpuReport {
    pub cuda_available: bool,
    pub device_count: i64,
    pub cudnn_available: bool,
    pub smi: SmiReport,
}

impl GpuReport {
    pub async fn collect(smi_path: &Path, query_timeout: Duration) -> Self {
        let cuda_available = tch::Cuda::is_available();
        Self {
            cuda_available,
            device_count: if cuda_available {
                tch::Cuda::device_count()
            } else {
                0
            },
            cudnn_available: tch::Cuda::cudnn_is_available(),
            smi: query_nvidia_smi(smi_path, query_timeout).await,
        }
    }
}

impl fmt::Display for GpuReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== GPU Information ===")?;
        writeln!(f, "CUDA available: {}", self.cuda_available)?;
        writeln!(f, "CUDA devices: {}", self.device_count)?;
        writeln!(f, "cuDNN available: {}", self.cudnn_available)?;
        writeln!(f)?;
        writeln!(f, "=== nvidia-smi ===")?;
        match &self.smi {
            SmiReport::Devices(devices) if devices.is_empty() => {
                writeln!(f, "no devices reported")
            }
            SmiReport::Devices(devices) => {
                for (idx, d) in devices.iter().enumerate() {
                    writeln!(
                        f,
                        "GPU {idx}: {} (driver {}, compute capability {})",
                        d.name, d.driver_version, d.compute_capability
                    )?;
                }
                Ok(())
            }
            SmiReport::Unavailable(reason) => writeln!(f, "no detailed info: {reason}"),
        }
    }
}

pub async fn query_nvidia_smi(program: &Path, query_timeout: Duration) -> SmiReport {
    let child = Command::new(program)
        .args(SMI_QUERY_ARGS)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match timeout(query_timeout, child).await {
        Err(_) => {
            return SmiReport::Unavailable(format!(
                "{} timed out after {query_timeout:?}",
                program.display()
            ));
        }
        Ok(Err(err)) => {
            debug!(%err, "nvidia-smi could not be started");
            return SmiReport::Unavailable(format!("{} not found: {err}", program.display()));
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        return SmiReport::Unavailable(format!(
            "{} exited with {}",
            program.display(),
            output.status
        ));
    }
    SmiReport::Devices(parse_smi_csv(&String::from_utf8_lossy(&output.stdout)))
}

pub fn parse_smi_csv(raw: &str) -> Vec<SmiDevice> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut fields = line.split(',').map(str::trim);
            let mut next = || fields.next().unwrap_or_default().to_string();
            SmiDevice {
                name: next(),
                driver_version: next(),
                compute_capability: next(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn parses_csv_rows() {
        let raw = "NVIDIA GeForce RTX 4090, 550.54.14, 8.9\n\nTesla P40, 535.104.05, 6.1\n";
        let devices = parse_smi_csv(raw);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "NVIDIA GeForce RTX 4090");
        assert_eq!(devices[0].driver_version, "550.54.14");
        assert_eq!(devices[1].compute_capability, "6.1");
    }

    #[test]
    fn short_rows_fill_missing_fields() {
        let devices = parse_smi_csv("Mystery GPU");
        assert_eq!(devices[0].driver_version, "");
    }

    #[tokio::test]
    async fn missing_binary_reports_unavailable() {
        let program = PathBuf::from("nvidia-smi-definitely-not-installed");
        let report = query_nvidia_smi(&program, Duration::from_secs(10)).await;
        match report {
            SmiReport::Unavailable(reason) => assert!(reason.contains("not found")),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, body: &str) -> PathBuf {
        use std::{fs, os::unix::fs::PermissionsExt};

        let path = dir.join("fake-smi");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_binary_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = write_script(dir.path(), "exec sleep 5");
        let report = query_nvidia_smi(&program, Duration::from_millis(200)).await;
        match report {
            SmiReport::Unavailable(reason) => {
                assert!(reason.contains("timed out after 200ms"), "{reason}")
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_binary_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let program = write_script(dir.path(), "echo 'driver not loaded' >&2\nexit 1");
        let report = query_nvidia_smi(&program, Duration::from_secs(10)).await;
        match report {
            SmiReport::Unavailable(reason) => assert!(reason.contains("exited with"), "{reason}"),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn csv_from_binary_becomes_devices() {
        let dir = tempfile::tempdir().unwrap();
        let program = write_script(dir.path(), "echo 'Tesla P40, 535.104.05, 6.1'");
        let report = query_nvidia_smi(&program, Duration::from_secs(10)).await;
        match report {
            SmiReport::Devices(devices) => assert_eq!(devices[0].compute_capability, "6.1"),
            other => panic!("expected devices, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn report_completes_without_smi() {
        let program = PathBuf::from("nvidia-smi-definitely-not-installed");
        let report = GpuReport::collect(&program, Duration::from_secs(10)).await;
        assert!(matches!(report.smi, SmiReport::Unavailable(_)));
        assert!(report.to_string().contains("no detailed info"));
    }
}
