//! Host Monitor – estatísticas da máquina local via `sysinfo`.
//!
//! Telemetria: `cpu_temp` (°F), `cpu_used`, `ram_used`, `disk_used` (%).
//! Atributos: tamanhos de disco/RAM, SO, último boot, uptime e o IPv4 de
//! cada interface de rede.

use crate::sources::TelemetrySource;
use std::net::IpAddr;
use sysinfo::{Components, CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use telemetry_core::{Reading, SourceReading};
use tracing::debug;

/// Monitor do host (compartilhado entre dispositivos com `sys_info`).
pub struct HostMonitor {
    sys: System,
    disks: Disks,
    networks: Networks,
    components: Components,
}

impl HostMonitor {
    pub fn new() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        // Uso de CPU precisa de duas amostras
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_all();

        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
        }
    }

    /// Busca a temperatura da CPU nos components do sysinfo (°C).
    fn cpu_temp_celsius(&self) -> Option<f32> {
        let mut temp: Option<f32> = None;
        for comp in self.components.iter() {
            let label = comp.label().to_lowercase();
            if label.contains("cpu")
                || label.contains("tctl")
                || label.contains("tdie")
                || label.contains("package")
                || label.contains("core")
            {
                if let Some(t) = comp.temperature() {
                    if t < 150.0 && temp.is_none_or(|max| t > max) {
                        temp = Some(t);
                    }
                }
            }
        }
        temp
    }

    /// Disco raiz, ou o maior se não houver `/`: (usado %, total bytes).
    fn root_disk(&self) -> Option<(f64, u64)> {
        let disk = self
            .disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
            .or_else(|| self.disks.iter().max_by_key(|d| d.total_space()))?;

        let total = disk.total_space();
        let used = total.saturating_sub(disk.available_space());
        Some((round1(percent(used, total)), total))
    }

    fn interface_addresses(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .networks
            .iter()
            .map(|(name, data)| {
                let ip = data
                    .ip_networks()
                    .iter()
                    .find_map(|net| match net.addr {
                        IpAddr::V4(v4) => Some(v4.to_string()),
                        IpAddr::V6(_) => None,
                    })
                    .unwrap_or_else(|| "none".into());
                (name.clone(), ip)
            })
            .collect();
        out.sort();
        out
    }
}

impl Default for HostMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for HostMonitor {
    fn name(&self) -> &'static str {
        "host"
    }

    fn read(&mut self) -> SourceReading {
        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();
        self.disks.refresh(true);
        self.components.refresh(true);
        self.networks.refresh(true);

        let mut reading = SourceReading::default();

        // ── Telemetria ──
        match self.cpu_temp_celsius() {
            Some(c) => reading.tele("cpu_temp", round1(c as f64 * 9.0 / 5.0 + 32.0)),
            None => reading.tele("cpu_temp", Reading::failed("sensor de temperatura indisponível")),
        }
        reading.tele("cpu_used", round1(self.sys.global_cpu_usage() as f64));
        reading.tele(
            "ram_used",
            round1(percent(self.sys.used_memory(), self.sys.total_memory())),
        );

        // ── Atributos ──
        match self.root_disk() {
            Some((used_pct, total)) => {
                reading.tele("disk_used", used_pct);
                reading.attr("disk_total", human_bytes(total));
            }
            None => reading.tele("disk_used", Reading::failed("nenhum disco encontrado")),
        }
        reading.attr("ram_total", human_bytes(self.sys.total_memory()));
        reading.attr("os_type", std::env::consts::FAMILY);
        reading.attr(
            "os_platform",
            System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        );
        reading.attr("os_release", System::kernel_version().unwrap_or_default());

        let boot = System::boot_time() as i64;
        if let Some(dt) = chrono::DateTime::from_timestamp(boot, 0) {
            let local = dt.with_timezone(&chrono::Local);
            reading.attr("last_boot", local.format("%Y-%m-%d %H:%M:%S").to_string());
        }
        reading.attr("uptime", format_uptime(System::uptime()));

        for (iface, ip) in self.interface_addresses() {
            reading.attr(iface, ip);
        }

        debug!(
            "Host: CPU {:.1}% | RAM {:.1}% | {} atributos",
            self.sys.global_cpu_usage(),
            percent(self.sys.used_memory(), self.sys.total_memory()),
            reading.attributes.len()
        );
        reading
    }
}

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn percent(used: u64, total: u64) -> f64 {
    if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Tamanho legível em base binária (ex.: "7.8 GiB").
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["Bytes", "KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{bytes} Bytes");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// "Nd, Nh, Nm" a partir de segundos.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = secs / 3_600 % 24;
    let minutes = secs / 60 % 60;
    format!("{days}d, {hours}h, {minutes}m")
}
