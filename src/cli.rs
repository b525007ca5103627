//! Shared CLI option structs for the reloc and relocd binaries

use crate::addr::AddressMode;
use clap::Parser;
use std::path::PathBuf;

/// Send one file or folder to a listening relocd
#[derive(Clone, Debug, Parser)]
#[command(name = "reloc", version, about)]
pub struct SendOpts {
    /// Address mode: internal (local network) or external (internet)
    #[arg(value_enum, ignore_case = true)]
    pub mode: AddressMode,

    /// File or folder to transmit
    pub path: PathBuf,

    /// Host the receiver listens on
    #[arg(long)]
    pub host: Option<String>,

    /// Port the receiver listens on
    #[arg(long)]
    pub port: Option<u16>,

    /// Connect/write timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Write on a background thread
    #[arg(long = "async")]
    pub is_async: bool,

    /// Show a progress bar while sending
    #[arg(short, long)]
    pub progress: bool,

    /// Config file (default: ~/.config/reloc/reloc.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Receive files and folders sent with reloc
#[derive(Clone, Debug, Parser)]
#[command(name = "relocd", version, about)]
pub struct ListenOpts {
    /// Address mode: internal binds localhost, external binds the LAN address
    #[arg(long, value_enum, ignore_case = true, default_value = "internal")]
    pub mode: AddressMode,

    /// Bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (required in external mode)
    #[arg(long)]
    pub port: Option<u16>,

    /// Destination root directory (default: home directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Run the accept loop on a background thread
    #[arg(long = "async")]
    pub is_async: bool,

    /// Write daily log files
    #[arg(long)]
    pub log: bool,

    /// Directory for daily log files
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Do not apply source modification times
    #[arg(long)]
    pub no_mtime: bool,

    /// Config file (default: ~/.config/reloc/reloc.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_opts_parse() {
        let o = SendOpts::try_parse_from(["reloc", "Internal", "notes", "--port", "9000"]).unwrap();
        assert_eq!(o.mode, AddressMode::Internal);
        assert_eq!(o.path, PathBuf::from("notes"));
        assert_eq!(o.port, Some(9000));
        assert!(o.host.is_none());
        assert!(!o.is_async);
    }

    #[test]
    fn test_listen_opts_defaults() {
        let o = ListenOpts::try_parse_from(["relocd"]).unwrap();
        assert_eq!(o.mode, AddressMode::Internal);
        assert!(o.port.is_none());
        assert!(!o.log);
    }

    #[test]
    fn test_send_opts_rejects_unknown_mode() {
        assert!(SendOpts::try_parse_from(["reloc", "public", "x"]).is_err());
    }
}
