//! Monitoring Probe (spec §4.G) — issues short command batches over a
//! session's SSH connection and parses the textual output into a typed
//! record describing the *remote* host, not the broker's own.
//!
//! Every parse step degrades to a zero/empty default instead of failing
//! the whole probe; a broken or missing remote data source never takes
//! the HTTP surface down with it, per spec §4.G ("never throws").

use serde::Serialize;

use crate::session::SshSession;

const SECTION: &str = "===SECTION===";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub cpu: CpuSnapshot,
    pub memory: MemorySnapshot,
    pub disk: DiskSnapshot,
    pub network: NetworkSnapshot,
    pub system: SystemSnapshot,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSnapshot {
    pub usage_percent: f64,
    pub model: String,
    pub load_average_1m: f64,
    pub load_average_5m: f64,
    pub load_average_15m: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub hostname: String,
    pub os_name: String,
    pub kernel: String,
    pub uptime: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRecord {
    pub user: String,
    pub source: String,
    pub timestamp: String,
    pub duration: String,
    pub status: LoginStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failed,
    Current,
}

pub struct MonitorProbe;

impl MonitorProbe {
    pub fn new() -> Self {
        Self
    }

    /// Four batched commands over the session's SSH connection, one per
    /// resource group (spec §4.G). A completely failed probe (every
    /// command errors) returns a zero-valued record, never an error.
    pub async fn snapshot(&self, session: &SshSession) -> ResourceSnapshot {
        let cpu = match session
            .exec(format!(
                "cat /proc/loadavg; echo {SECTION}; grep -m1 'model name' /proc/cpuinfo; echo {SECTION}; cat /proc/stat | head -1; sleep 0.1; echo {SECTION}; cat /proc/stat | head -1"
            ))
            .await
        {
            Ok(out) => parse_cpu(&out),
            Err(_) => CpuSnapshot::default(),
        };

        let memory = match session.exec("cat /proc/meminfo").await {
            Ok(out) => parse_memory(&out),
            Err(_) => MemorySnapshot::default(),
        };

        let disk = match session.exec("df -B1 /").await {
            Ok(out) => parse_disk(&out),
            Err(_) => DiskSnapshot::default(),
        };

        let (network, system) = match session
            .exec(format!(
                "cat /proc/net/dev; echo {SECTION}; cat /proc/uptime; echo {SECTION}; hostname; echo {SECTION}; uname -s; echo {SECTION}; uname -r"
            ))
            .await
        {
            Ok(out) => parse_network_and_system(&out),
            Err(_) => (NetworkSnapshot::default(), SystemSnapshot::default()),
        };

        ResourceSnapshot {
            cpu,
            memory,
            disk,
            network,
            system,
        }
    }

    /// `ps aux --sort=-%mem`, truncated to the top 10 by memory, process
    /// names clipped to 20 characters for display.
    pub async fn top_processes(&self, session: &SshSession) -> Vec<ProcessInfo> {
        match session.exec("ps aux --sort=-%mem").await {
            Ok(out) => out.lines().skip(1).take(10).filter_map(parse_ps_line).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Tries each login-history source in priority order and keeps the
    /// first that produces parseable output, then overlays `who` to mark
    /// currently-active sessions. Failed sources silently fall through;
    /// an all-failed probe returns an empty list.
    pub async fn login_history(&self, session: &SshSession) -> Vec<LoginRecord> {
        let mut records = Vec::new();
        for command in [
            "wtmpdb last",
            "last -Fw",
            "last",
            "lastlog | grep -v Never",
        ] {
            if let Ok(out) = session.exec(command).await {
                let parsed: Vec<LoginRecord> = out.lines().filter_map(parse_last_line).collect();
                if !parsed.is_empty() {
                    records = parsed;
                    break;
                }
            }
        }

        if records.is_empty() {
            for command in [
                "tail -n 200 /var/log/auth.log",
                "tail -n 200 /var/log/secure",
                "journalctl -u sshd -u ssh -n 200 --no-pager",
            ] {
                if let Ok(out) = session.exec(command).await {
                    let parsed: Vec<LoginRecord> =
                        out.lines().filter_map(parse_auth_log_line).collect();
                    if !parsed.is_empty() {
                        records = parsed;
                        break;
                    }
                }
            }
        }

        if let Ok(who_output) = session.exec("who").await {
            let current_users: Vec<&str> = who_output
                .lines()
                .filter_map(|l| l.split_whitespace().next())
                .collect();
            for record in &mut records {
                if current_users.contains(&record.user.as_str()) {
                    record.status = LoginStatus::Current;
                }
            }
        }

        dedup_login_records(records)
    }
}

impl Default for MonitorProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn sections(raw: &str) -> Vec<&str> {
    raw.split(SECTION).map(str::trim).collect()
}

fn parse_cpu(raw: &str) -> CpuSnapshot {
    let parts = sections(raw);
    let mut snapshot = CpuSnapshot::default();

    if let Some(loadavg) = parts.first() {
        let mut fields = loadavg.split_whitespace();
        snapshot.load_average_1m = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        snapshot.load_average_5m = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        snapshot.load_average_15m = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    }

    if let Some(model_line) = parts.get(1) {
        snapshot.model = model_line
            .split_once(':')
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_default();
    }

    if let (Some(first), Some(second)) = (parts.get(2), parts.get(3)) {
        if let (Some((total1, idle1)), Some((total2, idle2))) =
            (parse_stat_line(first), parse_stat_line(second))
        {
            let total_delta = total2.saturating_sub(total1);
            let idle_delta = idle2.saturating_sub(idle1);
            if total_delta > 0 {
                let busy_frac = 1.0 - (idle_delta as f64 / total_delta as f64);
                snapshot.usage_percent = (busy_frac * 100.0).clamp(0.0, 100.0);
            }
        }
    }

    snapshot
}

/// Parses a `cpu  ...` line from `/proc/stat` into `(total, idle)`.
fn parse_stat_line(line: &str) -> Option<(u64, u64)> {
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let idle = fields[3];
    let total: u64 = fields.iter().sum();
    Some((total, idle))
}

fn parse_memory(raw: &str) -> MemorySnapshot {
    let mut total_kb = 0u64;
    let mut free_kb = 0u64;
    let mut available_kb = 0u64;
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = parse_kb_field(rest);
        } else if let Some(rest) = line.strip_prefix("MemFree:") {
            free_kb = parse_kb_field(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = parse_kb_field(rest);
        }
    }
    let used_kb = total_kb.saturating_sub(available_kb);
    let used_percent = if total_kb > 0 {
        (used_kb as f64 / total_kb as f64) * 100.0
    } else {
        0.0
    };
    MemorySnapshot {
        total_bytes: total_kb * 1024,
        used_bytes: used_kb * 1024,
        free_bytes: free_kb * 1024,
        available_bytes: available_kb * 1024,
        used_percent,
    }
}

fn parse_kb_field(field: &str) -> u64 {
    field
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn parse_disk(raw: &str) -> DiskSnapshot {
    let Some(line) = raw.lines().nth(1) else {
        return DiskSnapshot::default();
    };
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return DiskSnapshot::default();
    }
    let total_bytes: u64 = fields[1].parse().unwrap_or(0);
    let used_bytes: u64 = fields[2].parse().unwrap_or(0);
    let free_bytes: u64 = fields[3].parse().unwrap_or(0);
    let used_percent = if total_bytes > 0 {
        (used_bytes as f64 / total_bytes as f64) * 100.0
    } else {
        0.0
    };
    DiskSnapshot {
        total_bytes,
        used_bytes,
        free_bytes,
        used_percent,
    }
}

fn parse_network_and_system(raw: &str) -> (NetworkSnapshot, SystemSnapshot) {
    let parts = sections(raw);

    let network = parts
        .first()
        .map(|net_dev| {
            let mut rx_total = 0u64;
            let mut tx_total = 0u64;
            for line in net_dev.lines().skip(2) {
                let Some((iface, rest)) = line.split_once(':') else {
                    continue;
                };
                if iface.trim() == "lo" {
                    continue;
                }
                let fields: Vec<u64> = rest
                    .split_whitespace()
                    .filter_map(|s| s.parse().ok())
                    .collect();
                if fields.len() >= 9 {
                    rx_total += fields[0];
                    tx_total += fields[8];
                }
            }
            NetworkSnapshot {
                rx_bytes: rx_total,
                tx_bytes: tx_total,
            }
        })
        .unwrap_or_default();

    let uptime = parts
        .get(1)
        .and_then(|s| s.split_whitespace().next())
        .and_then(|s| s.parse::<f64>().ok())
        .map(format_uptime)
        .unwrap_or_default();
    let hostname = parts.get(2).map(|s| s.trim().to_string()).unwrap_or_default();
    let os_name = parts.get(3).map(|s| s.trim().to_string()).unwrap_or_default();
    let kernel = parts.get(4).map(|s| s.trim().to_string()).unwrap_or_default();

    (
        network,
        SystemSnapshot {
            hostname,
            os_name,
            kernel,
            uptime,
        },
    )
}

fn format_uptime(total_secs: f64) -> String {
    let total = total_secs as u64;
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

fn parse_ps_line(line: &str) -> Option<ProcessInfo> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 11 {
        return None;
    }
    let pid = fields[1].parse().ok()?;
    let cpu_percent = fields[2].parse().ok()?;
    let mem_percent = fields[3].parse().ok()?;
    let mut name = fields[10..].join(" ");
    name.truncate(20);
    Some(ProcessInfo {
        pid,
        name,
        cpu_percent,
        mem_percent,
    })
}

fn parse_last_line(line: &str) -> Option<LoginRecord> {
    if line.is_empty() || line.starts_with("wtmp begins") || line.starts_with("btmp begins") {
        return None;
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }
    let status = if line.contains("still logged in") {
        LoginStatus::Current
    } else {
        LoginStatus::Success
    };
    Some(LoginRecord {
        user: fields[0].to_string(),
        source: fields.get(1).copied().unwrap_or("?").to_string(),
        timestamp: fields[2..].join(" "),
        duration: String::new(),
        status,
    })
}

/// Parses an `auth.log`/`journalctl` style line, tagging failed-password
/// attempts distinctly from accepted ones.
fn parse_auth_log_line(line: &str) -> Option<LoginRecord> {
    let status = if line.contains("Failed password") {
        LoginStatus::Failed
    } else if line.contains("Accepted password") || line.contains("Accepted publickey") {
        LoginStatus::Success
    } else {
        return None;
    };

    let user = line
        .split_whitespace()
        .skip_while(|w| *w != "for")
        .nth(1)
        .unwrap_or("?")
        .to_string();
    let source = line
        .split_whitespace()
        .skip_while(|w| *w != "from")
        .nth(1)
        .unwrap_or("?")
        .to_string();
    let timestamp = line.split_whitespace().take(3).collect::<Vec<_>>().join(" ");

    Some(LoginRecord {
        user,
        source,
        timestamp,
        duration: String::new(),
        status,
    })
}

fn dedup_login_records(records: Vec<LoginRecord>) -> Vec<LoginRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert((r.user.clone(), r.source.clone(), r.timestamp.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kb_field_reads_leading_number() {
        assert_eq!(parse_kb_field(" 1024 kB"), 1024);
    }

    #[test]
    fn parse_kb_field_defaults_to_zero_on_garbage() {
        assert_eq!(parse_kb_field(" not-a-number"), 0);
    }

    #[test]
    fn parse_ps_line_truncates_long_names() {
        let line = "root 1 0.0 0.1 0 0 ? S 00:00 0:00 a-very-long-process-name-here";
        let info = parse_ps_line(line).unwrap();
        assert!(info.name.len() <= 20);
    }

    #[test]
    fn parse_ps_line_rejects_short_lines() {
        assert!(parse_ps_line("root 1 0.0").is_none());
    }

    #[test]
    fn parse_memory_computes_used_from_available() {
        let raw = "MemTotal:       1000 kB\nMemFree:         200 kB\nMemAvailable:    400 kB\n";
        let mem = parse_memory(raw);
        assert_eq!(mem.total_bytes, 1000 * 1024);
        assert_eq!(mem.used_bytes, 600 * 1024);
    }

    #[test]
    fn parse_disk_reads_df_output() {
        let raw = "Filesystem 1B-blocks Used Available Use% Mounted\n/dev/sda1 1000 400 600 40% /\n";
        let disk = parse_disk(raw);
        assert_eq!(disk.total_bytes, 1000);
        assert_eq!(disk.used_bytes, 400);
        assert_eq!(disk.free_bytes, 600);
    }

    #[test]
    fn parse_cpu_on_garbage_defaults_to_zero() {
        let snapshot = parse_cpu("not valid output at all");
        assert_eq!(snapshot.usage_percent, 0.0);
        assert_eq!(snapshot.load_average_1m, 0.0);
    }

    #[test]
    fn dedup_login_records_drops_duplicates() {
        let records = vec![
            LoginRecord {
                user: "alice".into(),
                source: "pts/0".into(),
                timestamp: "Mon Jan 1".into(),
                duration: String::new(),
                status: LoginStatus::Success,
            },
            LoginRecord {
                user: "alice".into(),
                source: "pts/0".into(),
                timestamp: "Mon Jan 1".into(),
                duration: String::new(),
                status: LoginStatus::Success,
            },
        ];
        assert_eq!(dedup_login_records(records).len(), 1);
    }

    #[test]
    fn parse_auth_log_line_tags_failed_attempts() {
        let line = "Jan  1 00:00:00 host sshd[1]: Failed password for alice from 10.0.0.1 port 22 ssh2";
        let record = parse_auth_log_line(line).unwrap();
        assert_eq!(record.status, LoginStatus::Failed);
        assert_eq!(record.user, "alice");
    }
}
