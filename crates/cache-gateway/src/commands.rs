//! CLI command execution: one function per subcommand, matching the
//! original `CacheServerCommandHandler` method-for-method. Every function
//! returns `anyhow::Result<()>`; `main` prints `ERROR: {e}` to stderr and
//! exits 1 on failure (§7 propagation policy), and exits 0 on success.

use std::fs;
use std::net::SocketAddr;
use std::process::Command as StdCommand;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use uuid::Uuid;

use cache_coordinator::Coordinator;
use cache_db::cache::CacheFilter;
use cache_db::models::{Access, AgentRow, CacheRow, WorkspaceRow};
use cache_db::Db;
use cache_domain::Config;
use cache_store::{ArtifactStore, GcAgeSign, UploadRegistry};

use crate::cli::pid;
use crate::cli::{
    AgentCommand, CacheCommand, Cli, Command, ConfigCommand, StorePathCommand, WorkspaceCommand,
};
use crate::state::AppState;
use crate::substituter::{self, CacheState};
use crate::tokens;
use crate::{management, ws};

/// Top-level dispatch. `listen` and `stop` manage the management endpoint
/// itself and never require a prior running instance; every other command
/// does (§6 CLI surface: "Non-lifecycle commands require the management
/// PID file to exist").
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = crate::cli::config_path(cli.config);
    let config = Config::load(std::path::Path::new(&config_path))
        .map_err(|e| anyhow!("{e}"))?;

    match cli.command {
        Command::Listen => {
            let pid_path = pid::management_pid_path(&config.cache_dir);
            if pid_path.exists() {
                bail!("cache-server is already running");
            }
            return spawn_detached_server(&config_path);
        }
        Command::HiddenStartServer => {
            let db = Db::connect(&config.database).await.map_err(|e| anyhow!("{e}"))?;
            return listen(Arc::new(db), Arc::new(config), Arc::new(Coordinator::new())).await;
        }
        Command::Stop => return stop(&config),
        Command::Config(cmd) => return run_config(&config, cmd),
        _ => {}
    }

    let pid_path = pid::management_pid_path(&config.cache_dir);
    if !pid_path.exists() {
        bail!("cache-server is not running");
    }

    let db = Db::connect(&config.database).await.map_err(|e| anyhow!("{e}"))?;
    db.create_database().await.map_err(|e| anyhow!("{e}"))?;

    match cli.command {
        Command::Listen | Command::HiddenStartServer | Command::Stop | Command::Config(_) => {
            unreachable!()
        }
        Command::Cache(cmd) => run_cache(&db, &config, cmd).await,
        Command::Agent(cmd) => run_agent(&db, &config, cmd).await,
        Command::Workspace(cmd) => run_workspace(&db, &config, cmd).await,
        Command::StorePath(cmd) => run_store_path(&db, &config, cmd).await,
    }
}

/// Forks a detached child running [`listen`] in the foreground and returns
/// as soon as it is spawned, mirroring the original's
/// `subprocess.Popen(["cache-server", "hidden-start", "server"])`. The
/// child is responsible for writing and locking its own PID file once it
/// reaches [`listen`].
fn spawn_detached_server(config_path: &str) -> anyhow::Result<()> {
    let exe = std::env::current_exe()?;
    StdCommand::new(exe)
        .arg("hidden-start-server")
        .arg("--config")
        .arg(config_path)
        .spawn()
        .map_err(|e| anyhow!("failed to start management endpoint: {e}"))?;
    Ok(())
}

async fn run_cache(db: &Db, config: &Config, cmd: CacheCommand) -> anyhow::Result<()> {
    match cmd {
        CacheCommand::Create {
            name,
            port,
            retention,
        } => cache_create(db, config, name, port, retention).await,
        CacheCommand::Start { name } => {
            let db = Arc::new(db.clone());
            let config = Arc::new(config.clone());
            cache_start(db, config, name).await
        }
        CacheCommand::Stop { name } => {
            let cache = db
                .get_cache(&name)
                .await
                .map_err(|e| anyhow!("{e}"))?
                .ok_or_else(|| anyhow!("binary cache {name} does not exist"))?;
            cache_stop(config, &cache)
        }
        CacheCommand::Delete { name } => cache_delete(db, config, name).await,
        CacheCommand::Info { name } => cache_info(db, name).await,
        CacheCommand::Update {
            name,
            new_name,
            access,
            port,
            retention,
        } => cache_update(db, config, name, new_name, access, port, retention).await,
        CacheCommand::List { private, public } => cache_list(db, private, public).await,
    }
}

async fn run_agent(db: &Db, config: &Config, cmd: AgentCommand) -> anyhow::Result<()> {
    match cmd {
        AgentCommand::Add { name, workspace } => agent_add(db, config, name, workspace).await,
        AgentCommand::Remove { name } => agent_remove(db, name).await,
        AgentCommand::Info { name } => agent_info(db, name).await,
        AgentCommand::List { workspace } => agent_list(db, workspace).await,
    }
}

async fn run_workspace(db: &Db, config: &Config, cmd: WorkspaceCommand) -> anyhow::Result<()> {
    match cmd {
        WorkspaceCommand::Create { name, cache } => {
            workspace_create(db, config, name, cache).await
        }
        WorkspaceCommand::Delete { name } => workspace_delete(db, name).await,
        WorkspaceCommand::Info { name } => workspace_info(db, name).await,
        WorkspaceCommand::List => workspace_list(db).await,
        WorkspaceCommand::Cache { name, cache } => workspace_cache(db, name, cache).await,
    }
}

async fn run_store_path(db: &Db, config: &Config, cmd: StorePathCommand) -> anyhow::Result<()> {
    match cmd {
        StorePathCommand::List { cache } => store_path_list(db, cache).await,
        StorePathCommand::Delete { hash, cache } => {
            store_path_delete(db, config, hash, cache).await
        }
        StorePathCommand::Info { hash, cache } => store_path_info(db, hash, cache).await,
    }
}

// ---------------------------------------------------------------------
// Lifecycle: listen / stop
// ---------------------------------------------------------------------

/// Foreground management endpoint: the REST API on `server-port`, the
/// deployment channels on `deploy-port` (§5: "a long-lived bidirectional
/// channel server on a second port"). Runs until either listener fails.
/// Only ever reached via `hidden-start-server`, the detached child
/// `listen` spawns.
async fn listen(db: Arc<Db>, config: Arc<Config>, coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
    let pid_path = pid::management_pid_path(&config.cache_dir);
    let pid_handle = pid::write_pid_file(&pid_path)?;

    db.create_database().await.map_err(|e| anyhow!("{e}"))?;

    let state = AppState {
        config: config.clone(),
        db: db.clone(),
        coordinator: coordinator.clone(),
        uploads: Arc::new(UploadRegistry::new()),
    };

    let mgmt_app = management::router()
        .with_state(state.clone())
        .layer(tower_http::trace::TraceLayer::new_for_http());
    let ws_app = ws::router().with_state(state);

    let mgmt_listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.server_port)))
        .await?;
    let ws_listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.deploy_port)))
        .await?;

    println!("Server started http://localhost:{}", config.server_port);
    tracing::info!(port = config.server_port, deploy_port = config.deploy_port, "management endpoint listening");

    let result = tokio::select! {
        r = axum::serve(mgmt_listener, mgmt_app) => r,
        r = axum::serve(ws_listener, ws_app) => r,
    };

    pid::remove_pid_file(&pid_path, pid_handle);
    result.map_err(Into::into)
}

fn stop(config: &Config) -> anyhow::Result<()> {
    let pid_path = pid::management_pid_path(&config.cache_dir);
    pid::stop_via_pid_file(&pid_path)?;
    println!("Server stopped.");
    Ok(())
}

fn run_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Validate => {
            let issues = config.validate();
            if issues.is_empty() {
                println!("config OK");
                Ok(())
            } else {
                for issue in &issues {
                    println!("{issue}");
                }
                if issues
                    .iter()
                    .any(|i| i.severity == cache_domain::ConfigSeverity::Error)
                {
                    bail!("config validation failed");
                }
                Ok(())
            }
        }
        ConfigCommand::Show => {
            println!(
                "cache-dir = {}\ndatabase = {}\nhostname = {}\nserver-port = {}\ndeploy-port = {}",
                config.cache_dir.display(),
                config.database.display(),
                config.server_hostname,
                config.server_port,
                config.deploy_port
            );
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------
// cache *
// ---------------------------------------------------------------------

async fn cache_create(
    db: &Db,
    config: &Config,
    name: String,
    port: u16,
    retention: i64,
) -> anyhow::Result<()> {
    if db.get_cache(&name).await.map_err(|e| anyhow!("{e}"))?.is_some() {
        bail!("binary cache {name} already exists");
    }
    if db
        .get_cache_by_port(port)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .is_some()
    {
        bail!("there already is a binary cache with port {port}");
    }

    let cache_dir = config.cache_dir.join(&name);
    if cache_dir.exists() {
        bail!("directory {} already exists", cache_dir.display());
    }
    fs::create_dir_all(&cache_dir)?;
    cache_signer::write_keypair(&cache_dir, &name, &config.server_hostname)
        .map_err(|e| anyhow!("{e}"))?;

    let row = CacheRow {
        id: Uuid::new_v4().to_string(),
        name: name.clone(),
        url: format!("http://{name}.{}", config.server_hostname),
        token: tokens::generate(&name, &config.key),
        access: Access::Public.as_str().to_string(),
        port: port.to_string(),
        retention,
    };
    db.insert_cache(&row).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

async fn cache_start(db: Arc<Db>, config: Arc<Config>, name: String) -> anyhow::Result<()> {
    let cache = db
        .get_cache(&name)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("binary cache {name} does not exist"))?;

    let pid_path = pid::cache_pid_path(&config.cache_dir, &cache.id);
    if pid_path.exists() {
        bail!("binary cache {name} is already running");
    }
    let pid_handle = pid::write_pid_file(&pid_path)?;

    let cache_dir = config.cache_dir.join(&name);

    if cache.retention > 0 {
        let gc_dir = cache_dir.clone();
        let retention = cache.retention;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                if let Err(e) = cache_store::gc::sweep(&gc_dir, retention, GcAgeSign::Corrected) {
                    tracing::warn!(error = %e, "gc sweep failed");
                }
            }
        });
    }

    let store = Arc::new(ArtifactStore::new(cache_dir));
    let port = cache.port_number();
    let cache_state = CacheState {
        cache: Arc::new(cache),
        db,
        store,
    };
    let app = substituter::router(cache_state);

    println!("Binary cache started http://localhost:{port}");
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    let result = axum::serve(listener, app).await;

    pid::remove_pid_file(&pid_path, pid_handle);
    result.map_err(Into::into)
}

fn cache_stop(config: &Config, cache: &CacheRow) -> anyhow::Result<()> {
    let pid_path = pid::cache_pid_path(&config.cache_dir, &cache.id);
    // Unlike the global `stop`, a not-currently-running cache is reported
    // rather than treated as an error (mirrors the original's asymmetry
    // between `stop_command` and `cache_stop`).
    match pid::stop_via_pid_file(&pid_path) {
        Ok(()) => println!("Server stopped."),
        Err(_) => println!("Server is not running."),
    }
    Ok(())
}

async fn cache_delete(db: &Db, config: &Config, name: String) -> anyhow::Result<()> {
    let cache = db
        .get_cache(&name)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("binary cache {name} does not exist"))?;

    let workspaces = db.list_workspaces().await.map_err(|e| anyhow!("{e}"))?;
    if let Some(w) = workspaces.iter().find(|w| w.cache_name == name) {
        bail!("binary cache {name} is connected to workspace {}", w.name);
    }

    let pid_path = pid::cache_pid_path(&config.cache_dir, &cache.id);
    if pid_path.exists() {
        bail!("binary cache {name} is running");
    }

    let cache_dir = config.cache_dir.join(&name);
    fs::remove_dir_all(&cache_dir)?;
    db.delete_all_cache_paths(&name).await.map_err(|e| anyhow!("{e}"))?;
    db.delete_cache(&name).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

async fn cache_info(db: &Db, name: String) -> anyhow::Result<()> {
    let cache = db
        .get_cache(&name)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("binary cache {name} does not exist"))?;

    let retention = if cache.retention == -1 {
        "None".to_string()
    } else {
        cache.retention.to_string()
    };

    println!(
        "Id: {}\nName: {}\nUrl: {}\nToken: {}\nAccess: {}\nPort: {}\nRetention: {}",
        cache.id, cache.name, cache.url, cache.token, cache.access, cache.port, retention
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cache_update(
    db: &Db,
    config: &Config,
    name: String,
    new_name: Option<String>,
    access: Option<String>,
    port: Option<u16>,
    retention: Option<i64>,
) -> anyhow::Result<()> {
    let mut cache = db
        .get_cache(&name)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("binary cache {name} does not exist"))?;

    let pid_path = pid::cache_pid_path(&config.cache_dir, &cache.id);
    if pid_path.exists() {
        bail!("binary cache {name} is running");
    }

    if let Some(access) = access {
        cache.access = access;
    }

    if let Some(new_name) = new_name {
        if db.get_cache(&new_name).await.map_err(|e| anyhow!("{e}"))?.is_none() {
            let old_dir = config.cache_dir.join(&cache.name);
            let new_dir = config.cache_dir.join(&new_name);
            fs::rename(&old_dir, &new_dir)?;
            db.rename_cache_in_workspaces(&cache.name, &new_name)
                .await
                .map_err(|e| anyhow!("{e}"))?;
            db.rename_cache_in_paths(&cache.name, &new_name)
                .await
                .map_err(|e| anyhow!("{e}"))?;
            cache.url = format!("http://{new_name}.{}", config.server_hostname);
            cache.token = tokens::generate(&new_name, &config.key);
            cache.name = new_name;
        } else {
            eprintln!("ERROR: binary cache {new_name} already exists. Name won't be changed.");
        }
    }

    if let Some(retention) = retention {
        cache.retention = retention;
    }
    if let Some(port) = port {
        cache.port = port.to_string();
    }

    db.update_cache(&cache).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

async fn cache_list(db: &Db, private: bool, public: bool) -> anyhow::Result<()> {
    let filter = if private {
        CacheFilter::Private
    } else if public {
        CacheFilter::Public
    } else {
        CacheFilter::All
    };
    for row in db.list_caches(filter).await.map_err(|e| anyhow!("{e}"))? {
        println!("{}", row.name);
    }
    Ok(())
}

// ---------------------------------------------------------------------
// agent *
// ---------------------------------------------------------------------

async fn agent_add(db: &Db, config: &Config, name: String, workspace: String) -> anyhow::Result<()> {
    if db.get_agent(&name).await.map_err(|e| anyhow!("{e}"))?.is_some() {
        bail!("agent {name} already exists");
    }
    if db.get_workspace(&workspace).await.map_err(|e| anyhow!("{e}"))?.is_none() {
        bail!("workspace {workspace} does not exist");
    }
    let row = AgentRow {
        id: Uuid::new_v4().to_string(),
        name: name.clone(),
        token: tokens::generate(&name, &config.key),
        workspace_name: workspace,
    };
    db.insert_agent(&row).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

async fn agent_remove(db: &Db, name: String) -> anyhow::Result<()> {
    if db.get_agent(&name).await.map_err(|e| anyhow!("{e}"))?.is_none() {
        bail!("agent {name} does not exist");
    }
    db.delete_agent(&name).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

async fn agent_info(db: &Db, name: String) -> anyhow::Result<()> {
    let agent = db
        .get_agent(&name)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("agent {name} does not exist"))?;
    println!(
        "Id: {}\nName: {}\nToken: {}\nWorkspace: {}",
        agent.id, agent.name, agent.token, agent.workspace_name
    );
    Ok(())
}

async fn agent_list(db: &Db, workspace: String) -> anyhow::Result<()> {
    if db.get_workspace(&workspace).await.map_err(|e| anyhow!("{e}"))?.is_none() {
        bail!("workspace {workspace} does not exist");
    }
    for row in db
        .list_workspace_agents(&workspace)
        .await
        .map_err(|e| anyhow!("{e}"))?
    {
        println!("{}", row.name);
    }
    Ok(())
}

// ---------------------------------------------------------------------
// workspace *
// ---------------------------------------------------------------------

async fn workspace_create(
    db: &Db,
    config: &Config,
    name: String,
    cache: String,
) -> anyhow::Result<()> {
    if db.get_workspace(&name).await.map_err(|e| anyhow!("{e}"))?.is_some() {
        bail!("workspace {name} already exists");
    }
    if db.get_cache(&cache).await.map_err(|e| anyhow!("{e}"))?.is_none() {
        bail!("binary cache {cache} does not exist");
    }
    let row = WorkspaceRow {
        id: Uuid::new_v4().to_string(),
        token: tokens::generate(&name, &config.key),
        name,
        cache_name: cache,
    };
    db.insert_workspace(&row).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

async fn workspace_delete(db: &Db, name: String) -> anyhow::Result<()> {
    if db.get_workspace(&name).await.map_err(|e| anyhow!("{e}"))?.is_none() {
        bail!("workspace {name} does not exist");
    }
    db.delete_all_workspace_agents(&name)
        .await
        .map_err(|e| anyhow!("{e}"))?;
    db.delete_workspace(&name).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

async fn workspace_info(db: &Db, name: String) -> anyhow::Result<()> {
    let workspace = db
        .get_workspace(&name)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("workspace {name} does not exist"))?;
    println!(
        "Id: {}\nName: {}\nToken: {}\nCache: {}",
        workspace.id, workspace.name, workspace.token, workspace.cache_name
    );
    Ok(())
}

async fn workspace_list(db: &Db) -> anyhow::Result<()> {
    for row in db.list_workspaces().await.map_err(|e| anyhow!("{e}"))? {
        println!("{}", row.name);
    }
    Ok(())
}

async fn workspace_cache(db: &Db, name: String, cache: String) -> anyhow::Result<()> {
    let mut workspace = db
        .get_workspace(&name)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("workspace {name} does not exist"))?;
    if db.get_cache(&cache).await.map_err(|e| anyhow!("{e}"))?.is_none() {
        bail!("binary cache {cache} does not exist");
    }
    workspace.cache_name = cache;
    db.update_workspace(&workspace).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

// ---------------------------------------------------------------------
// store-path *
// ---------------------------------------------------------------------

async fn store_path_list(db: &Db, cache: String) -> anyhow::Result<()> {
    if db.get_cache(&cache).await.map_err(|e| anyhow!("{e}"))?.is_none() {
        bail!("binary cache {cache} does not exist");
    }
    for row in db.list_store_paths(&cache).await.map_err(|e| anyhow!("{e}"))? {
        println!("{}", row.store_hash);
    }
    Ok(())
}

async fn store_path_delete(
    db: &Db,
    config: &Config,
    hash: String,
    cache: String,
) -> anyhow::Result<()> {
    if db.get_cache(&cache).await.map_err(|e| anyhow!("{e}"))?.is_none() {
        bail!("binary cache {cache} does not exist");
    }
    let path = db
        .get_store_path_by_store_hash(&cache, &hash)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("store path not found"))?;

    let store = ArtifactStore::new(config.cache_dir.join(&cache));
    store.remove_archive(&path.file_hash).map_err(|e| anyhow!("{e}"))?;
    db.delete_store_path(&cache, &hash).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

async fn store_path_info(db: &Db, hash: String, cache: String) -> anyhow::Result<()> {
    if db.get_cache(&cache).await.map_err(|e| anyhow!("{e}"))?.is_none() {
        bail!("binary cache {cache} does not exist");
    }
    let path = db
        .get_store_path_by_store_hash(&cache, &hash)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("store path not found"))?;
    println!(
        "Store hash: {}\nStore suffix: {}\nFile hash: {}",
        path.store_hash, path.store_suffix, path.file_hash
    );
    Ok(())
}
