use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Public => "public",
            Access::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "private" => Access::Private,
            _ => Access::Public,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CacheRow {
    pub id: String,
    pub name: String,
    pub url: String,
    pub token: String,
    pub access: String,
    pub port: String,
    pub retention: i64,
}

impl CacheRow {
    pub fn access(&self) -> Access {
        Access::parse(&self.access)
    }

    pub fn port_number(&self) -> u16 {
        self.port.parse().unwrap_or(0)
    }
}

#[derive(Debug, Clone, FromRow)]
struct StorePathRowRaw {
    id: String,
    store_hash: String,
    store_suffix: String,
    file_hash: String,
    file_size: i64,
    nar_hash: String,
    nar_size: i64,
    deriver: String,
    refs: String,
    cache_name: String,
}

#[derive(Debug, Clone)]
pub struct StorePathRow {
    pub id: String,
    pub store_hash: String,
    pub store_suffix: String,
    pub file_hash: String,
    pub file_size: i64,
    pub nar_hash: String,
    pub nar_size: i64,
    pub deriver: String,
    pub references: Vec<String>,
    pub cache_name: String,
}

impl From<StorePathRowRaw> for StorePathRow {
    fn from(raw: StorePathRowRaw) -> Self {
        Self {
            id: raw.id,
            store_hash: raw.store_hash,
            store_suffix: raw.store_suffix,
            file_hash: raw.file_hash,
            file_size: raw.file_size,
            nar_hash: raw.nar_hash,
            nar_size: raw.nar_size,
            deriver: raw.deriver,
            references: raw
                .refs
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            cache_name: raw.cache_name,
        }
    }
}

pub(crate) use StorePathRowRaw as RawStorePathRow;

#[derive(Debug, Clone, FromRow)]
pub struct WorkspaceRow {
    pub id: String,
    pub name: String,
    pub token: String,
    pub cache_name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct AgentRow {
    pub id: String,
    pub name: String,
    pub token: String,
    pub workspace_name: String,
}
