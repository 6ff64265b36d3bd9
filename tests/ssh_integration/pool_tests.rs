//! Connection pool tests against the Docker server

use std::sync::Arc;

use hostlink::config::{HostKeyPolicy, PoolSettings};
use hostlink::ssh::{
    CommandRequest, ConnectionPool, DiagnosticCommand, OsFamily, RemoteSession, ShellDialect,
    adapt,
};

use super::fixtures::SshTestEnvironment;

fn pool_for(env: &SshTestEnvironment) -> ConnectionPool<hostlink::ssh::SshClient> {
    ConnectionPool::new(env.client(HostKeyPolicy::AcceptNew), PoolSettings::default())
}

#[tokio::test]
async fn test_pool_reuses_live_session() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let pool = pool_for(&env);
    let config = env.password_config();

    let first = pool
        .get_connection(&env.server.host, &config)
        .await
        .expect("connect");
    let second = pool
        .get_connection(&env.server.host, &config)
        .await
        .expect("reuse");

    assert!(Arc::ptr_eq(&first, &second));
    let status = pool.pool_status();
    assert_eq!(status.total_connections, 1);
    assert_eq!(status.active_connections, 1);

    pool.close_all().await;
    assert!(!first.is_connected());
}

#[tokio::test]
async fn test_pool_classifies_linux_server() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let pool = pool_for(&env);
    let config = env.password_config();

    let session = pool
        .get_connection(&env.server.host, &config)
        .await
        .expect("connect");
    let os = pool
        .os_info(&env.server.host, &config)
        .expect("classification is stored with the entry");

    assert_eq!(os.family, OsFamily::Linux);
    assert_eq!(os.shell, ShellDialect::Bash);
    assert!(os.architecture.is_some());

    let command = adapt(&os, CommandRequest::Diagnostic(DiagnosticCommand::DiskUsage));
    assert_eq!(command, "df -h");
    let result = session.execute_command(&command).await.expect("df runs");
    assert!(result.success());
    assert!(result.stdout.contains("Filesystem"));

    pool.close_all().await;
}

#[tokio::test]
async fn test_pool_replaces_closed_session() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let pool = pool_for(&env);
    let config = env.password_config();

    let first = pool
        .get_connection(&env.server.host, &config)
        .await
        .expect("connect");
    first.disconnect().await.expect("disconnect");

    let second = pool
        .get_connection(&env.server.host, &config)
        .await
        .expect("reconnect");
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.is_connected());

    pool.close_all().await;
    pool.close_all().await;
    assert_eq!(pool.pool_status().total_connections, 0);
}

#[tokio::test]
async fn test_pool_failure_leaves_no_entry() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let pool = pool_for(&env);
    let mut config = env.password_config();
    config.password = Some(secrecy::SecretString::from("wrong-password".to_string()));

    let err = pool
        .get_connection(&env.server.host, &config)
        .await
        .expect_err("bad credentials");
    assert!(err.is_connection_error());
    assert_eq!(pool.pool_status().total_connections, 0);
}
