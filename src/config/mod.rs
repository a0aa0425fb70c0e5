use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default callback base URL. `{organization_id}` is replaced per job.
pub const DEFAULT_CALLBACK_BASE_URL: &str =
    "https://{organization_id}.sydle.one/api/1/pdf-compression/_classId";

/// Settings for the external compression tool
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Maximum accepted input size in bytes (default: 25 MB)
    pub max_input_bytes: usize,

    /// Path to the compression tool binary (default: "gs")
    pub tool_path: String,

    /// Requested profile: screen, ebook, printer, prepress or default (default: "ebook")
    pub profile: String,

    /// Hard limit for a single tool run in seconds (default: 30)
    pub timeout_seconds: u64,

    /// Maximum concurrent tool runs, process-wide (default: 1)
    pub max_concurrent: usize,

    /// How long a run waits for a free slot before failing as busy (default: 5)
    pub admission_timeout_seconds: u64,

    /// Apply the "only keep smaller output" rule on the async path too (default: false)
    pub async_keep_smaller: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 25 * 1024 * 1024, // 25 MB
            tool_path: "gs".to_string(),
            profile: "ebook".to_string(),
            timeout_seconds: 30,
            max_concurrent: 1,
            admission_timeout_seconds: 5,
            async_keep_smaller: false,
        }
    }
}

impl CompressionConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_input_bytes: parse_env("PDF_MAX_INPUT_BYTES", default.max_input_bytes),
            tool_path: env::var("GS_PATH").unwrap_or(default.tool_path),
            profile: env::var("GS_PROFILE").unwrap_or(default.profile),
            timeout_seconds: parse_env("GS_TIMEOUT_SECONDS", default.timeout_seconds),
            max_concurrent: parse_env("GS_MAX_CONCURRENT", default.max_concurrent),
            admission_timeout_seconds: parse_env(
                "GS_ADMISSION_TIMEOUT_SECONDS",
                default.admission_timeout_seconds,
            ),
            async_keep_smaller: parse_flag("ASYNC_KEEP_SMALLER", default.async_keep_smaller),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_seconds)
    }
}

/// Deployment environment owning one organization/token pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Dev,
    Hom,
    Prd,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Dev, Tier::Hom, Tier::Prd];

    fn env_prefix(self) -> &'static str {
        match self {
            Tier::Dev => "CALLBACK_DEV",
            Tier::Hom => "CALLBACK_HOM",
            Tier::Prd => "CALLBACK_PRD",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TierConfig {
    pub organization_id: Option<String>,

    /// Stored token, `"Encrypted: "` + base64(iv || ciphertext)
    pub token: Option<String>,
}

impl TierConfig {
    fn from_env(tier: Tier) -> Self {
        let prefix = tier.env_prefix();
        Self {
            organization_id: env::var(format!("{prefix}_ORGANIZATION_ID")).ok(),
            token: env::var(format!("{prefix}_TOKEN")).ok(),
        }
    }
}

/// Organization token table, one entry per tier. Read-only after startup.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    pub dev: TierConfig,
    pub hom: TierConfig,
    pub prd: TierConfig,
}

impl TokenTable {
    pub fn from_env() -> Self {
        Self {
            dev: TierConfig::from_env(Tier::Dev),
            hom: TierConfig::from_env(Tier::Hom),
            prd: TierConfig::from_env(Tier::Prd),
        }
    }

    pub fn tier(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Dev => &self.dev,
            Tier::Hom => &self.hom,
            Tier::Prd => &self.prd,
        }
    }

    /// First tier whose organization id equals `organization_id`, in dev/hom/prd order.
    pub fn find_tier(&self, organization_id: &str) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|tier| self.tier(*tier).organization_id.as_deref() == Some(organization_id))
    }

    /// Encrypted token of the matching tier. A matching tier without a token yields `None`.
    pub fn token_for_org(&self, organization_id: &str) -> Option<&str> {
        self.find_tier(organization_id)
            .and_then(|tier| self.tier(tier).token.as_deref())
    }
}

/// Outbound callback settings
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Base URL template containing `{organization_id}`
    pub base_url: String,

    /// Routing class identifier inserted after the base URL
    pub file_class_id: String,

    pub tokens: TokenTable,

    /// Per-request timeout in seconds (default: 60)
    pub timeout_seconds: u64,

    /// Skip the call instead of sending it unauthenticated when no tier matches (default: false)
    pub require_credentials: bool,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CALLBACK_BASE_URL.to_string(),
            file_class_id: String::new(),
            tokens: TokenTable::default(),
            timeout_seconds: 60,
            require_credentials: false,
        }
    }
}

impl CallbackConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            base_url: env::var("CALLBACK_BASE_URL").unwrap_or(default.base_url),
            file_class_id: env::var("CALLBACK_FILE_CLASS_ID").unwrap_or(default.file_class_id),
            tokens: TokenTable::from_env(),
            timeout_seconds: parse_env("CALLBACK_TIMEOUT_SECONDS", default.timeout_seconds),
            require_credentials: parse_flag(
                "CALLBACK_REQUIRE_CREDENTIALS",
                default.require_credentials,
            ),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Asynchronous job pipeline settings
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Number of worker tasks draining the queue (default: 4)
    pub workers: usize,

    /// Jobs that may wait in the queue before submissions are refused (default: 64)
    pub queue_capacity: usize,

    /// Minimum time between acceptance and the first notification (default: 3s)
    pub min_latency: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            min_latency: Duration::from_millis(3000),
        }
    }
}

impl JobConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            workers: parse_env("JOB_WORKERS", default.workers).max(1),
            queue_capacity: parse_env("JOB_QUEUE_CAPACITY", default.queue_capacity).max(1),
            min_latency: Duration::from_millis(parse_env(
                "JOB_MIN_LATENCY_MS",
                default.min_latency.as_millis() as u64,
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub compression: CompressionConfig,
    pub callback: CallbackConfig,
    pub jobs: JobConfig,

    /// Bearer token expected on every `/api` request
    pub api_token: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            compression: CompressionConfig::default(),
            callback: CallbackConfig::default(),
            jobs: JobConfig::default(),
            api_token: "placeholder".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            compression: CompressionConfig::from_env(),
            callback: CallbackConfig::from_env(),
            jobs: JobConfig::from_env(),
            api_token: env::var("API_TOKEN").unwrap_or(default.api_token),
        }
    }

    /// Create config for development (short latency, relaxed concurrency)
    pub fn development() -> Self {
        Self {
            compression: CompressionConfig {
                max_concurrent: 2,
                ..CompressionConfig::default()
            },
            callback: CallbackConfig::default(),
            jobs: JobConfig {
                workers: 2,
                queue_capacity: 16,
                min_latency: Duration::from_millis(0),
            },
            api_token: "dev-token".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| {
            let v = v.trim().to_lowercase();
            v == "true" || v == "1" || v == "yes"
        })
        .unwrap_or(default)
}
