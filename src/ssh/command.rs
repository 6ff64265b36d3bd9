//! Rewriting of generic commands into the syntax a host's shell expects.

use super::os_detect::{OsClassification, OsFamily, ShellDialect};

/// Adapt `command` to the shell dialect in `os`.
///
/// PowerShell hosts get the command wrapped in `powershell "..."` with inner
/// double quotes escaped, unless it already invokes PowerShell. Every other
/// dialect receives the command unchanged.
pub fn format_command(os: &OsClassification, command: &str) -> String {
    match os.shell {
        ShellDialect::PowerShell => {
            if command.to_lowercase().starts_with("powershell") {
                command.to_string()
            } else {
                format!("powershell \"{}\"", command.replace('"', "\\\""))
            }
        }
        ShellDialect::Cmd | ShellDialect::Bash | ShellDialect::Sh => command.to_string(),
    }
}

/// Host diagnostics with a canonical command per OS family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCommand {
    SystemInfo,
    DiskUsage,
    MemoryUsage,
    CpuUsage,
    TopProcesses,
}

impl DiagnosticCommand {
    pub const ALL: [DiagnosticCommand; 5] = [
        DiagnosticCommand::SystemInfo,
        DiagnosticCommand::DiskUsage,
        DiagnosticCommand::MemoryUsage,
        DiagnosticCommand::CpuUsage,
        DiagnosticCommand::TopProcesses,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticCommand::SystemInfo => "system-info",
            DiagnosticCommand::DiskUsage => "disk-usage",
            DiagnosticCommand::MemoryUsage => "memory-usage",
            DiagnosticCommand::CpuUsage => "cpu-usage",
            DiagnosticCommand::TopProcesses => "top-processes",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.name() == name)
    }

    /// The canonical command line for `family`. Windows entries are already
    /// wrapped for PowerShell where they need it.
    pub fn for_family(&self, family: OsFamily) -> &'static str {
        match (self, family) {
            (DiagnosticCommand::SystemInfo, OsFamily::Windows) => "systeminfo",
            (DiagnosticCommand::SystemInfo, OsFamily::Linux | OsFamily::Unix) => {
                "uname -a && hostname && uptime"
            }
            (DiagnosticCommand::SystemInfo, OsFamily::Unknown) => {
                "echo \"System: $(uname -s 2>/dev/null || echo Unknown)\""
            }

            (DiagnosticCommand::DiskUsage, OsFamily::Windows) => {
                "powershell \"Get-WmiObject Win32_LogicalDisk | Select-Object DeviceID, @{Name='Size(GB)';Expression={[math]::Round($_.Size/1GB,2)}}, @{Name='FreeSpace(GB)';Expression={[math]::Round($_.FreeSpace/1GB,2)}}, @{Name='%Free';Expression={[math]::Round(($_.FreeSpace/$_.Size)*100,2)}}\""
            }
            (DiagnosticCommand::DiskUsage, _) => "df -h",

            (DiagnosticCommand::MemoryUsage, OsFamily::Windows) => {
                "powershell \"Get-WmiObject Win32_OperatingSystem | Select-Object @{Name='TotalMemory(GB)';Expression={[math]::Round($_.TotalVisibleMemorySize/1MB,2)}}, @{Name='FreeMemory(GB)';Expression={[math]::Round($_.FreePhysicalMemory/1MB,2)}}, @{Name='UsedMemory(GB)';Expression={[math]::Round(($_.TotalVisibleMemorySize-$_.FreePhysicalMemory)/1MB,2)}}\""
            }
            (DiagnosticCommand::MemoryUsage, _) => "free -h",

            (DiagnosticCommand::CpuUsage, OsFamily::Windows) => {
                "powershell \"Get-Counter '\\Processor(_Total)\\% Processor Time' -SampleInterval 1 -MaxSamples 1 | Select-Object -ExpandProperty CounterSamples | Select-Object CookedValue\""
            }
            (DiagnosticCommand::CpuUsage, _) => "top -bn1 | grep \"Cpu(s)\" || uptime",

            (DiagnosticCommand::TopProcesses, OsFamily::Windows) => {
                "powershell \"Get-Process | Sort-Object CPU -Descending | Select-Object -First 10 Name, @{Name='CPU(s)';Expression={$_.CPU}}, @{Name='Memory(MB)';Expression={[math]::Round($_.WorkingSet/1MB,2)}} | Format-Table -AutoSize\""
            }
            (DiagnosticCommand::TopProcesses, _) => "ps aux --sort=-pcpu | head -11",
        }
    }
}

impl std::fmt::Display for DiagnosticCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a caller wants to run on a classified host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRequest<'a> {
    Diagnostic(DiagnosticCommand),
    Raw(&'a str),
}

/// Produce the command line to send for `request` on a host classified as `os`.
pub fn adapt(os: &OsClassification, request: CommandRequest<'_>) -> String {
    match request {
        CommandRequest::Diagnostic(diagnostic) => {
            format_command(os, diagnostic.for_family(os.family))
        }
        CommandRequest::Raw(command) => format_command(os, command),
    }
}
