//! Datasource capture commands: payload messages, the optional helper
//! capabilities that answer them, and report senders.
//!
//! A helper that does not implement a capability still answers the host
//! with the conventional negative (or empty) report.

use std::fmt;

use tracing::debug;

use extwire_frame::commands;

use crate::error::Result;
use crate::handle::Handle;
use crate::messages::{MessageType, MsgbusMessage};

/// Command outcome embedded in every report.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SubSuccess {
    #[prost(bool, required, tag = "1")]
    pub success: bool,
    #[prost(uint64, optional, tag = "2")]
    pub seqno: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubChannel {
    #[prost(string, required, tag = "1")]
    pub channel: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubChanset {
    #[prost(string, repeated, tag = "1")]
    pub channels: Vec<String>,
}

/// Channel hopping configuration.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SubChanhop {
    #[prost(double, required, tag = "1")]
    pub rate: f64,
    #[prost(string, repeated, tag = "2")]
    pub channels: Vec<String>,
    #[prost(bool, optional, tag = "3")]
    pub shuffle: Option<bool>,
    #[prost(uint32, optional, tag = "4")]
    pub shuffle_skip: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub offset: Option<u32>,
}

/// One capture interface offered in an interfaces report.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SubInterface {
    #[prost(string, required, tag = "1")]
    pub interface: String,
    #[prost(string, optional, tag = "2")]
    pub flags: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub hardware: Option<String>,
}

/// `KDSCONFIGURE` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Configure {
    #[prost(message, optional, tag = "1")]
    pub channel: Option<SubChannel>,
    #[prost(message, optional, tag = "2")]
    pub hopping: Option<SubChanhop>,
}

/// `KDSPROBESOURCE` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ProbeSource {
    #[prost(string, required, tag = "1")]
    pub definition: String,
}

/// `KDSOPENSOURCE` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct OpenSource {
    #[prost(string, required, tag = "1")]
    pub definition: String,
}

/// `KDSLISTINTERFACES` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ListInterfaces {}

/// `KDSCONFIGUREREPORT` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConfigureReport {
    #[prost(message, optional, tag = "1")]
    pub success: Option<SubSuccess>,
    #[prost(message, optional, tag = "2")]
    pub message: Option<MsgbusMessage>,
    #[prost(message, optional, tag = "3")]
    pub channel: Option<SubChannel>,
    #[prost(message, optional, tag = "4")]
    pub hopping: Option<SubChanhop>,
    #[prost(string, optional, tag = "5")]
    pub warning: Option<String>,
}

/// `KDSERROR` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorReport {
    #[prost(message, optional, tag = "1")]
    pub success: Option<SubSuccess>,
    #[prost(message, optional, tag = "2")]
    pub message: Option<MsgbusMessage>,
}

/// `KDSINTERFACESREPORT` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct InterfacesReport {
    #[prost(message, optional, tag = "1")]
    pub success: Option<SubSuccess>,
    #[prost(message, optional, tag = "2")]
    pub message: Option<MsgbusMessage>,
    #[prost(message, repeated, tag = "3")]
    pub interfaces: Vec<SubInterface>,
}

/// `KDSNEWSOURCE` payload, announcing a remote-capture source.
#[derive(Clone, PartialEq, prost::Message)]
pub struct NewSource {
    #[prost(string, required, tag = "1")]
    pub definition: String,
    #[prost(string, required, tag = "2")]
    pub sourcetype: String,
    #[prost(string, required, tag = "3")]
    pub uuid: String,
}

/// `KDSOPENSOURCEREPORT` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct OpenSourceReport {
    #[prost(message, optional, tag = "1")]
    pub success: Option<SubSuccess>,
    #[prost(message, optional, tag = "2")]
    pub message: Option<MsgbusMessage>,
    #[prost(message, optional, tag = "3")]
    pub channels: Option<SubChanset>,
    #[prost(message, optional, tag = "4")]
    pub channel: Option<SubChannel>,
    #[prost(message, optional, tag = "5")]
    pub hop_config: Option<SubChanhop>,
    #[prost(string, optional, tag = "6")]
    pub hardware: Option<String>,
    #[prost(uint32, optional, tag = "7")]
    pub dlt: Option<u32>,
    #[prost(string, optional, tag = "8")]
    pub capture_interface: Option<String>,
    #[prost(string, optional, tag = "9")]
    pub uuid: Option<String>,
    #[prost(string, optional, tag = "10")]
    pub warning: Option<String>,
}

/// `KDSPROBESOURCEREPORT` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ProbeSourceReport {
    #[prost(message, optional, tag = "1")]
    pub success: Option<SubSuccess>,
    #[prost(message, optional, tag = "2")]
    pub message: Option<MsgbusMessage>,
    #[prost(message, optional, tag = "3")]
    pub channels: Option<SubChanset>,
    #[prost(message, optional, tag = "4")]
    pub channel: Option<SubChannel>,
    #[prost(string, optional, tag = "6")]
    pub hardware: Option<String>,
}

/// `KDSWARNINGREPORT` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WarningReport {
    #[prost(string, required, tag = "1")]
    pub warning: String,
}

/// Outcome block plus optional message, severity following the outcome.
fn outcome(
    seqno: u64,
    success: bool,
    message: Option<&str>,
) -> (Option<SubSuccess>, Option<MsgbusMessage>) {
    let kind = if success {
        MessageType::Info
    } else {
        MessageType::Error
    };
    (
        Some(SubSuccess {
            success,
            seqno: Some(seqno),
        }),
        message.map(|text| MsgbusMessage::new(text, kind)),
    )
}

impl Handle {
    /// Report a source failure, in answer to command `seqno` or 0 for a
    /// runtime failure.
    pub fn send_datasource_error_report(&self, seqno: u64, message: Option<&str>) -> Result<u64> {
        let (success, message) = outcome(seqno, false, message);
        self.send_command(commands::KDSERROR, &ErrorReport { success, message })
    }

    /// Answer `KDSCONFIGURE` command `seqno`. Fields of `report` other than
    /// the outcome and message are sent as given.
    pub fn send_datasource_configure_report(
        &self,
        seqno: u64,
        success: bool,
        message: Option<&str>,
        mut report: ConfigureReport,
    ) -> Result<u64> {
        (report.success, report.message) = outcome(seqno, success, message);
        self.send_command(commands::KDSCONFIGUREREPORT, &report)
    }

    /// Answer `KDSLISTINTERFACES` command `seqno`. Having no interfaces is
    /// not a failure.
    pub fn send_datasource_interfaces_report(
        &self,
        seqno: u64,
        interfaces: Vec<SubInterface>,
        success: bool,
        message: Option<&str>,
    ) -> Result<u64> {
        let (success, message) = outcome(seqno, success, message);
        self.send_command(
            commands::KDSINTERFACESREPORT,
            &InterfacesReport {
                success,
                message,
                interfaces,
            },
        )
    }

    /// Tell the host which driver to create for a remote-capture source.
    pub fn send_datasource_newsource(
        &self,
        definition: &str,
        sourcetype: &str,
        uuid: &str,
    ) -> Result<u64> {
        self.send_command(
            commands::KDSNEWSOURCE,
            &NewSource {
                definition: definition.to_owned(),
                sourcetype: sourcetype.to_owned(),
                uuid: uuid.to_owned(),
            },
        )
    }

    /// Answer `KDSOPENSOURCE` command `seqno`.
    pub fn send_datasource_open_report(
        &self,
        seqno: u64,
        success: bool,
        message: Option<&str>,
        mut report: OpenSourceReport,
    ) -> Result<u64> {
        (report.success, report.message) = outcome(seqno, success, message);
        self.send_command(commands::KDSOPENSOURCEREPORT, &report)
    }

    /// Answer `KDSPROBESOURCE` command `seqno`. Helpers that cannot drive
    /// the definition report failure, usually without a message.
    pub fn send_datasource_probe_report(
        &self,
        seqno: u64,
        success: bool,
        message: Option<&str>,
        mut report: ProbeSourceReport,
    ) -> Result<u64> {
        (report.success, report.message) = outcome(seqno, success, message);
        self.send_command(commands::KDSPROBESOURCEREPORT, &report)
    }

    /// Flag a non-fatal problem on the source.
    pub fn send_datasource_warning_report(&self, warning: &str) -> Result<u64> {
        self.send_command(
            commands::KDSWARNINGREPORT,
            &WarningReport {
                warning: warning.to_owned(),
            },
        )
    }
}

type ConfigureFn = Box<dyn FnMut(&Handle, u64, Configure) -> Result<()> + Send>;
type DefinitionFn = Box<dyn FnMut(&Handle, u64, &str) -> Result<()> + Send>;
type ListFn = Box<dyn FnMut(&Handle, u64) -> Result<()> + Send>;

/// Datasource operations a helper implements. Unset slots fall back to the
/// conventional answer.
#[derive(Default)]
pub struct DatasourceCapabilities {
    configure: Option<ConfigureFn>,
    probe_source: Option<DefinitionFn>,
    open_source: Option<DefinitionFn>,
    list_interfaces: Option<ListFn>,
}

impl DatasourceCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configure<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Handle, u64, Configure) -> Result<()> + Send + 'static,
    {
        self.configure = Some(Box::new(f));
        self
    }

    /// `f` receives the command seqno and the source definition.
    pub fn with_probe_source<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Handle, u64, &str) -> Result<()> + Send + 'static,
    {
        self.probe_source = Some(Box::new(f));
        self
    }

    /// `f` receives the command seqno and the source definition.
    pub fn with_open_source<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Handle, u64, &str) -> Result<()> + Send + 'static,
    {
        self.open_source = Some(Box::new(f));
        self
    }

    pub fn with_list_interfaces<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Handle, u64) -> Result<()> + Send + 'static,
    {
        self.list_interfaces = Some(Box::new(f));
        self
    }

    /// Whether the helper implements the datasource command `command`.
    pub fn supports(&self, command: &str) -> bool {
        match command {
            commands::KDSCONFIGURE => self.configure.is_some(),
            commands::KDSPROBESOURCE => self.probe_source.is_some(),
            commands::KDSOPENSOURCE => self.open_source.is_some(),
            commands::KDSLISTINTERFACES => self.list_interfaces.is_some(),
            _ => false,
        }
    }

    pub(crate) fn configure(&mut self, ctx: &Handle, seqno: u64, conf: Configure) -> Result<()> {
        match self.configure.as_mut() {
            Some(f) => f(ctx, seqno, conf),
            None => {
                debug!(seqno, "configure not supported");
                ctx.send_datasource_configure_report(
                    seqno,
                    false,
                    Some("helper does not support source configuration"),
                    ConfigureReport::default(),
                )?;
                Ok(())
            }
        }
    }

    pub(crate) fn probe_source(&mut self, ctx: &Handle, seqno: u64, probe: ProbeSource) -> Result<()> {
        match self.probe_source.as_mut() {
            Some(f) => f(ctx, seqno, &probe.definition),
            None => {
                debug!(seqno, definition = %probe.definition, "probe not supported");
                ctx.send_datasource_probe_report(seqno, false, None, ProbeSourceReport::default())?;
                Ok(())
            }
        }
    }

    pub(crate) fn open_source(&mut self, ctx: &Handle, seqno: u64, open: OpenSource) -> Result<()> {
        match self.open_source.as_mut() {
            Some(f) => f(ctx, seqno, &open.definition),
            None => {
                debug!(seqno, definition = %open.definition, "open not supported");
                ctx.send_datasource_open_report(
                    seqno,
                    false,
                    Some("helper does not support opening sources"),
                    OpenSourceReport::default(),
                )?;
                Ok(())
            }
        }
    }

    pub(crate) fn list_interfaces(&mut self, ctx: &Handle, seqno: u64) -> Result<()> {
        match self.list_interfaces.as_mut() {
            Some(f) => f(ctx, seqno),
            None => {
                debug!(seqno, "interface listing not supported");
                ctx.send_datasource_interfaces_report(seqno, Vec::new(), true, None)?;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for DatasourceCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceCapabilities")
            .field("configure", &self.configure.is_some())
            .field("probe_source", &self.probe_source.is_some())
            .field("open_source", &self.open_source.is_some())
            .field("list_interfaces", &self.list_interfaces.is_some())
            .finish()
    }
}
