use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use secrecy::SecretString;

use hostlink::config::{AppConfig, ConnectionConfig, paths};
use hostlink::ssh::{
    CommandRequest, ConnectionPool, DiagnosticCommand, OsClassification, ReconnectPolicy,
    RemoteSession, SshClient, adapt,
};
use hostlink::validation::parse_target;
use hostlink::{logging, shutdown};

const USAGE: &str = "usage: hostlink [user@]host[:port] [command...]\n\
\n\
Runs `command` (or the system-info diagnostic) on the host, adapted to its\n\
shell. A single word naming a diagnostic (system-info, disk-usage,\n\
memory-usage, cpu-usage, top-processes) runs the host's variant of it.\n\
\n\
Credentials: HOSTLINK_PASSWORD, HOSTLINK_IDENTITY (private key path),\n\
otherwise ~/.ssh/config, the SSH agent and default identity files.";

struct Invocation {
    host: String,
    config: ConnectionConfig,
    command: Vec<String>,
}

fn parse_invocation(
    args: &[String],
    app_config: &AppConfig,
) -> anyhow::Result<Option<Invocation>> {
    let Some((raw_target, command)) = args.split_first() else {
        return Ok(None);
    };
    if raw_target == "-h" || raw_target == "--help" {
        return Ok(None);
    }

    let target = parse_target(raw_target).context("Invalid target")?;
    let config = ConnectionConfig {
        port: target.port,
        username: target
            .username
            .or_else(|| app_config.ssh.default_username.clone()),
        password: std::env::var("HOSTLINK_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty())
            .map(SecretString::from),
        private_key: std::env::var_os("HOSTLINK_IDENTITY").map(PathBuf::from),
        ..ConnectionConfig::default()
    };

    Ok(Some(Invocation {
        host: target.host,
        config,
        command: command.to_vec(),
    }))
}

/// `joined` is `command` joined with spaces
fn request_for<'a>(command: &[String], joined: &'a str) -> CommandRequest<'a> {
    match command {
        [] => CommandRequest::Diagnostic(DiagnosticCommand::SystemInfo),
        [single] => match DiagnosticCommand::from_name(single) {
            Some(diagnostic) => CommandRequest::Diagnostic(diagnostic),
            None => CommandRequest::Raw(joined),
        },
        _ => CommandRequest::Raw(joined),
    }
}

fn print_classification(host: &str, os: &OsClassification) {
    println!("host:         {}", host);
    println!("os:           {} ({})", os.family, os.version);
    if let Some(arch) = &os.architecture {
        println!("architecture: {}", arch);
    }
    println!("shell:        {}", os.shell);
}

async fn run(
    pool: &ConnectionPool<SshClient>,
    invocation: &Invocation,
    policy: ReconnectPolicy,
) -> anyhow::Result<ExitCode> {
    let host = invocation.host.as_str();
    let session = policy
        .retry(|_| pool.get_connection(host, &invocation.config))
        .await
        .with_context(|| format!("Could not connect to {}", host))?;

    let os = pool
        .os_info(host, &invocation.config)
        .unwrap_or_else(OsClassification::unknown);
    print_classification(host, &os);

    let joined = invocation.command.join(" ");
    let command_line = adapt(&os, request_for(&invocation.command, &joined));
    tracing::debug!("Running '{}' on {}", command_line, host);

    let result = session
        .execute_command(&command_line)
        .await
        .with_context(|| format!("Could not run command on {}", host))?;

    println!();
    print!("{}", result.stdout);
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&pool.pool_status())?);

    Ok(if result.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(u8::try_from(result.exit_code).unwrap_or(1))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging with file output.
    let log_dir = paths::ensure_log_dir().ok();
    let _guard = logging::init_logging(log_dir);

    let app_config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Using default settings: {}", e);
            AppConfig::default()
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(invocation) = parse_invocation(&args, &app_config)? else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    };

    let pool = ConnectionPool::new(SshClient::new(app_config.ssh.clone()), app_config.pool.clone());
    let policy = ReconnectPolicy::from_settings(&app_config.retry);

    let outcome = tokio::select! {
        outcome = run(&pool, &invocation, policy) => outcome,
        _ = shutdown::wait_for_shutdown_signal() => Ok(ExitCode::from(130)),
    };

    pool.close_all().await;
    outcome
}
