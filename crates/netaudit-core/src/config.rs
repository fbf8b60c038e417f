//! Immutable process configuration: a single `Config` value constructed
//! once at startup from CLI flags and clamped environment overrides, then
//! threaded into the driver.

use crate::budget;
use crate::governor::{B_MAX, B_MIN, H_MAX, H_MIN, P_MAX, P_MIN, T_MAX, T_MIN};
use std::env;
use std::path::PathBuf;

pub const NVD_STALENESS_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Leve,
    Completo,
    Auto,
}

impl Mode {
    fn resolved(self) -> ResolvedMode {
        match self {
            Mode::Leve => ResolvedMode::Leve,
            Mode::Completo => ResolvedMode::Completo,
            Mode::Auto => {
                if cfg!(windows) {
                    ResolvedMode::Leve
                } else {
                    ResolvedMode::Completo
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedMode {
    Leve,
    Completo,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub hosts_workers: u32,
    pub ports_workers: u32,
    pub timeout_socket: f64,
    pub max_sockets: usize,
    pub batch_size: u32,
    pub resolve_hostname: bool,
    pub tcp_only: bool,
    pub skip_cve: bool,
    pub skip_nvd_update: bool,
    pub nvd_dir: PathBuf,
    pub nvd_index_max_years: u32,
    pub cpe_part_allowed: String,
    pub mode: Mode,
}

impl Config {
    /// Builds the preset for `mode`, then applies clamped environment
    /// overrides.
    pub fn build(mode: Mode) -> Self {
        let resolved = mode.resolved();
        let (hosts_workers, ports_workers, timeout_socket, batch_size, resolve_hostname, tcp_only, skip_cve) =
            match resolved {
                ResolvedMode::Leve => (6u32, 3u32, 2.0f64, 8u32, false, true, true),
                ResolvedMode::Completo => (8u32, 4u32, 3.0f64, 10u32, true, false, false),
            };

        let mut cfg = Config {
            hosts_workers,
            ports_workers,
            timeout_socket,
            max_sockets: budget::platform_default_max_sockets(),
            batch_size,
            resolve_hostname,
            tcp_only,
            skip_cve,
            skip_nvd_update: resolved == ResolvedMode::Leve,
            nvd_dir: PathBuf::from("nvd_data"),
            nvd_index_max_years: crate::cve_index::DEFAULT_MAX_YEARS,
            cpe_part_allowed: crate::cve_index::DEFAULT_CPE_PART.to_string(),
            mode,
        };

        cfg.apply_env_overrides();
        cfg.clamp();
        cfg
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u32("VH_MAX_HOSTS_WORKERS") {
            self.hosts_workers = v;
        }
        if let Some(v) = env_u32("VH_MAX_PORTS_WORKERS") {
            self.ports_workers = v;
        }
        if let Some(v) = env_f64("VH_TIMEOUT_SOCKET") {
            self.timeout_socket = v;
        }
        if let Some(v) = env_usize("VH_MAX_SOCKETS") {
            self.max_sockets = v;
        }
        if let Some(v) = env_u32("VH_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = env_bool("VH_RESOLVE_HOSTNAME") {
            self.resolve_hostname = v;
        }
        if let Some(v) = env_bool("VH_TCP_ONLY") {
            self.tcp_only = v;
        }
        if let Some(v) = env_bool("VH_SKIP_CVE") {
            self.skip_cve = v;
        }
        if let Some(v) = env_bool("VH_SKIP_NVD_UPDATE") {
            self.skip_nvd_update = v;
        }
        if let Ok(v) = env::var("NVD_DIR") {
            if !v.trim().is_empty() {
                self.nvd_dir = PathBuf::from(v);
            }
        }
        if let Some(v) = env_u32("NVD_INDEX_MAX_YEARS") {
            self.nvd_index_max_years = v;
        }
        if let Ok(v) = env::var("CPE_PART_ALLOWED") {
            if !v.trim().is_empty() {
                self.cpe_part_allowed = v;
            }
        }
    }

    fn clamp(&mut self) {
        self.hosts_workers = self.hosts_workers.clamp(H_MIN, H_MAX);
        self.ports_workers = self.ports_workers.clamp(P_MIN, P_MAX);
        self.timeout_socket = self.timeout_socket.clamp(T_MIN, T_MAX);
        self.batch_size = self.batch_size.clamp(B_MIN, B_MAX);
        self.max_sockets = budget::clamp_max_sockets(self.max_sockets);
        self.nvd_index_max_years = self.nvd_index_max_years.max(1);

        let ceiling = (self.max_sockets as f64 * 0.85).floor() as u32;
        while self.hosts_workers * self.ports_workers > ceiling && self.ports_workers > P_MIN {
            self.ports_workers -= 1;
        }
        while self.hosts_workers * self.ports_workers > ceiling && self.hosts_workers > H_MIN {
            self.hosts_workers -= 1;
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| match v.trim() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leve_preset_matches_spec_values() {
        let cfg = Config::build(Mode::Leve);
        assert_eq!(cfg.hosts_workers, 6);
        assert_eq!(cfg.ports_workers, 3);
        assert_eq!(cfg.batch_size, 8);
        assert!(cfg.tcp_only);
        assert!(cfg.skip_cve);
    }

    #[test]
    fn completo_preset_matches_spec_values() {
        let cfg = Config::build(Mode::Completo);
        assert_eq!(cfg.hosts_workers, 8);
        assert_eq!(cfg.ports_workers, 4);
        assert_eq!(cfg.batch_size, 10);
        assert!(!cfg.tcp_only);
        assert!(!cfg.skip_cve);
    }

    #[test]
    fn clamp_enforces_host_port_ceiling() {
        let mut cfg = Config::build(Mode::Completo);
        cfg.hosts_workers = 12;
        cfg.ports_workers = 6;
        cfg.max_sockets = 64;
        cfg.clamp();
        let ceiling = (64.0_f64 * 0.85).floor() as u32;
        assert!(cfg.hosts_workers * cfg.ports_workers <= ceiling);
    }
}
