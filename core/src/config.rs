//! Rule and storage configuration loading.
//!
//! Loads configuration from `~/.config/kioku/kioku.toml` (or `KIOKU_CONFIG`
//! env). All keyword tables are immutable once loaded and are injected into
//! the classifiers at construction, so tests can substitute their own rules.
//!
//! Table order is significant for key matching and is preserved exactly as
//! configured (arrays of tables, not maps).

use crate::errors::{MemoryError, Result};
use crate::types::ItemType;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for the knowledge store
#[derive(Debug, Deserialize, Clone)]
pub struct RuleConfig {
    /// Path to the SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory holding JSONL conversation logs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// SQLite busy timeout in milliseconds (write-intent lock wait bound)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Maximum candidates returned by the suggestion extractor
    #[serde(default = "default_max_auto_suggestions")]
    pub max_auto_suggestions: usize,

    /// Character-set Jaccard similarity above which two suggestion titles
    /// are considered duplicates
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,

    /// Ordered key tables, constitution layer scanned before operation
    #[serde(default)]
    pub keys: KeyTables,

    /// Per-type keyword lists, in fixed priority order
    #[serde(default = "default_type_keywords")]
    pub type_keywords: Vec<TypeRule>,

    /// Confidence phrasing markers
    #[serde(default)]
    pub confidence: ConfidenceMarkers,

    /// Suggestion extractor settings
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

fn default_db_path() -> String {
    dirs::home_dir()
        .map(|h| {
            h.join(".config")
                .join("kioku")
                .join("memory.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "memory.db".to_string())
}

fn default_log_dir() -> String {
    dirs::home_dir()
        .map(|h| {
            h.join(".config")
                .join("kioku")
                .join("logs")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "logs".to_string())
}

fn default_busy_timeout_ms() -> u32 {
    3000
}

fn default_max_auto_suggestions() -> usize {
    5
}

fn default_duplicate_threshold() -> f64 {
    0.7
}

/// One key with its match keywords; order within a table matters
#[derive(Debug, Deserialize, Clone)]
pub struct KeywordRule {
    pub key: String,
    pub patterns: Vec<String>,
}

fn rule(key: &str, patterns: &[&str]) -> KeywordRule {
    KeywordRule {
        key: key.to_string(),
        patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
    }
}

/// Ordered keyword tables for key assignment
#[derive(Debug, Deserialize, Clone)]
pub struct KeyTables {
    /// Constitution-layer keys, scanned first
    #[serde(default = "default_constitution_keys")]
    pub constitution: Vec<KeywordRule>,

    /// Operation-layer keys, scanned second
    #[serde(default = "default_operation_keys")]
    pub operation: Vec<KeywordRule>,
}

impl Default for KeyTables {
    fn default() -> Self {
        Self {
            constitution: default_constitution_keys(),
            operation: default_operation_keys(),
        }
    }
}

fn default_constitution_keys() -> Vec<KeywordRule> {
    vec![
        rule(
            "architecture_overview",
            &[
                "アーキテクチャ",
                "全体構成",
                "構成",
                "レイヤ",
                "三層",
                "モノリス",
                "マイクロサービス",
            ],
        ),
        rule(
            "component_responsibility",
            &["責務", "役割", "分担", "境界", "コンポーネント", "サービス分割"],
        ),
        rule(
            "data_flow_overview",
            &["データフロー", "処理フロー", "同期", "非同期", "イベント", "キュー"],
        ),
        rule(
            "integration_overview",
            &["連携", "外部API", "Webhook", "バッチ連携", "ETL"],
        ),
        rule(
            "security_baseline",
            &["セキュリティ", "最小権限", "暗号化", "TLS", "監査", "コンプライアンス"],
        ),
        rule(
            "availability_slo",
            &["可用性", "冗長化", "HA", "SLO", "SLA", "RTO", "RPO", "DR"],
        ),
        rule(
            "scalability_strategy",
            &["スケール", "水平", "垂直", "オートスケール", "負荷分散"],
        ),
        rule(
            "observability_strategy",
            &["可観測性", "監視", "ログ", "メトリクス", "トレース", "APM", "相関ID"],
        ),
        rule(
            "data_retention_policy",
            &["保持", "retention", "保存期間", "年数"],
        ),
        rule(
            "release_governance",
            &["リリース", "変更管理", "レビュー", "承認", "ロールバック", "段階リリース"],
        ),
    ]
}

fn default_operation_keys() -> Vec<KeywordRule> {
    vec![
        // インフラ/基盤
        rule(
            "os_baseline",
            &["OS", "Linux", "Windows", "パッチ", "アップデート", "EOL", "LTS"],
        ),
        rule(
            "server_sizing_policy",
            &[
                "サーバ",
                "スペック",
                "CPU",
                "vCPU",
                "メモリ",
                "RAM",
                "ディスク",
                "サイジング",
            ],
        ),
        rule(
            "storage_layout_policy",
            &["パーティション", "LVM", "RAID", "マウント", "IOPS", "暗号化ディスク"],
        ),
        rule(
            "capacity_management",
            &["容量管理", "使用率", "逼迫", "閾値", "増設", "リサイズ"],
        ),
        rule(
            "virtualization_platform",
            &["仮想化", "VM", "ハイパーバイザ", "コンテナ", "Docker", "Kubernetes"],
        ),
        rule(
            "network_topology",
            &["ネットワーク", "VPC", "サブネット", "セグメント", "NAT", "プロキシ"],
        ),
        rule(
            "port_and_protocol_policy",
            &[
                "ポート",
                "protocol",
                "TCP",
                "UDP",
                "公開",
                "内部通信",
                "mTLS",
                "443",
                "80",
            ],
        ),
        rule(
            "dns_and_routing_policy",
            &["DNS", "名前解決", "FQDN", "CNAME", "ルート", "route"],
        ),
        rule(
            "load_balancing_policy",
            &["ロードバランサ", "LB", "負荷分散", "L7", "L4", "ヘルスチェック"],
        ),
        rule(
            "firewall_policy",
            &["ファイアウォール", "FW", "WAF", "ACL", "allow", "deny", "ホワイトリスト"],
        ),
        rule(
            "access_control_policy",
            &["アクセス制御", "踏み台", "bastion", "管理経路", "IP制限"],
        ),
        rule(
            "backup_and_restore_procedure",
            &["バックアップ", "リストア", "復元", "スナップショット", "復旧訓練"],
        ),
        // 認証・秘密情報
        rule(
            "authentication_method",
            &["認証", "authentication", "SSO", "OIDC", "SAML", "MFA"],
        ),
        rule(
            "authorization_model",
            &["認可", "authorization", "権限", "RBAC", "ABAC", "ロール"],
        ),
        rule(
            "secret_management",
            &[
                "シークレット",
                "secret",
                "APIキー",
                "鍵",
                "KMS",
                "Vault",
                "ローテーション",
            ],
        ),
        rule(
            "certificate_policy",
            &["証明書", "certificate", "TLS", "mTLS", "CA", "期限", "更新"],
        ),
        // アプリ/API/設定
        // timeout comes before configuration_management: "タイムアウト設定"
        // must land on the timeout key, not the generic 設定 bucket.
        rule(
            "timeout_and_retry_policy",
            &["タイムアウト", "timeout", "リトライ", "retry", "バックオフ"],
        ),
        rule(
            "configuration_management",
            &["設定", "config", "環境変数", ".env", "設定ファイル", "パラメータ"],
        ),
        rule(
            "api_contract_policy",
            &["API", "契約", "OpenAPI", "スキーマ", "バージョン", "互換性"],
        ),
        rule(
            "rate_limit_policy",
            &["レート制限", "rate limit", "スロットリング", "429", "クォータ"],
        ),
        rule(
            "error_handling_policy",
            &["エラー処理", "例外", "exception", "失敗時", "フォールバック"],
        ),
        rule(
            "logging_policy",
            &["ログ", "ログレベル", "相関ID", "PII", "マスキング", "監査ログ"],
        ),
        // データ/DB
        rule(
            "database_schema_policy",
            &["スキーマ", "テーブル", "DDL", "主キー", "外部キー", "マイグレーション"],
        ),
        rule(
            "indexing_strategy",
            &["インデックス", "index", "実行計画", "チューニング"],
        ),
        rule(
            "transaction_policy",
            &["トランザクション", "ACID", "分離レベル", "ロック", "SAGA"],
        ),
        rule(
            "data_archival_procedure",
            &["削除", "アーカイブ", "ジョブ", "手順"],
        ),
        // テスト/運用
        rule(
            "test_strategy",
            &["テスト", "単体", "結合", "E2E", "回帰", "負荷試験"],
        ),
        rule(
            "ci_cd_pipeline_policy",
            &["CI", "CD", "パイプライン", "ビルド", "自動化", "署名"],
        ),
        rule(
            "deployment_procedure",
            &["デプロイ", "Blue/Green", "カナリア", "ローリング", "ロールバック"],
        ),
        rule(
            "monitoring_and_alerting_rules",
            &["監視", "メトリクス", "アラート", "閾値", "ダッシュボード"],
        ),
        rule(
            "incident_response_runbook",
            &["障害", "インシデント", "一次対応", "エスカレーション", "ポストモーテム"],
        ),
    ]
}

/// Keywords counted for one semantic type
#[derive(Debug, Deserialize, Clone)]
pub struct TypeRule {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub keywords: Vec<String>,
}

fn default_type_keywords() -> Vec<TypeRule> {
    let kw = |item_type: ItemType, words: &[&str]| TypeRule {
        item_type,
        keywords: words.iter().map(|w| (*w).to_string()).collect(),
    };
    vec![
        kw(
            ItemType::Decision,
            &["決定", "判断", "選択", "採用", "廃止", "に統一", "を使用"],
        ),
        kw(
            ItemType::Config,
            &["設定", "パラメータ", "値", "configure", "タイムアウト", "ポート"],
        ),
        kw(
            ItemType::Procedure,
            &["手順", "プロセス", "フロー", "やり方", "実施", "実行"],
        ),
        kw(
            ItemType::DesignNote,
            &["原則", "方針", "哲学", "考え方", "禁止", "必ず"],
        ),
    ]
}

/// Phrasing markers used by the confidence classifier
#[derive(Debug, Deserialize, Clone)]
pub struct ConfidenceMarkers {
    /// Decisive phrasings; HIGH requires one of these
    #[serde(default = "default_decisive_markers")]
    pub decisive: Vec<String>,

    /// Recommendation phrasings; these cap at MED
    #[serde(default = "default_recommendation_markers")]
    pub recommendation: Vec<String>,
}

fn default_decisive_markers() -> Vec<String> {
    ["に統一", "を使用", "必ず", "禁止", "してはならない"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn default_recommendation_markers() -> Vec<String> {
    vec!["推奨".to_string()]
}

impl Default for ConfidenceMarkers {
    fn default() -> Self {
        Self {
            decisive: default_decisive_markers(),
            recommendation: default_recommendation_markers(),
        }
    }
}

/// Suggestion extractor settings
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractorConfig {
    /// Decision-phrasing markers gating extraction from assistant turns
    #[serde(default = "default_decision_markers")]
    pub decision_markers: Vec<String>,

    /// Title length cap in characters
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,

    /// Content length cap in characters
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_decision_markers() -> Vec<String> {
    [
        "に統一",
        "を使用",
        "必ず",
        "禁止",
        "してはならない",
        "推奨",
        "採用",
        "廃止",
        "べき",
        "ルール",
        "原則",
        "方針",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_max_title_chars() -> usize {
    100
}

fn default_max_content_chars() -> usize {
    500
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            decision_markers: default_decision_markers(),
            max_title_chars: default_max_title_chars(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_auto_suggestions: default_max_auto_suggestions(),
            duplicate_threshold: default_duplicate_threshold(),
            keys: KeyTables::default(),
            type_keywords: default_type_keywords(),
            confidence: ConfidenceMarkers::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

impl RuleConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "KIOKU_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "kioku.toml";

    /// Load configuration from file
    ///
    /// Resolution order:
    /// 1. `KIOKU_CONFIG` environment variable
    /// 2. `~/.config/kioku/kioku.toml`
    ///
    /// If the config file doesn't exist, returns the built-in defaults.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "rule config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: RuleConfig = toml::from_str(contents)
            .map_err(|e| MemoryError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolve the configuration file path
    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("kioku")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.keys.constitution.is_empty() && self.keys.operation.is_empty() {
            tracing::warn!("both key tables are empty; every item will land in misc_operation");
        }

        if !(0.0..=1.0).contains(&self.duplicate_threshold) {
            return Err(MemoryError::config(format!(
                "duplicate_threshold must be within 0.0..=1.0, got {}",
                self.duplicate_threshold
            )));
        }

        if self.type_keywords.is_empty() {
            tracing::warn!("type_keywords is empty; every item will classify as decision");
        }

        Ok(())
    }

    /// Get the resolved database path (expanding ~ if needed)
    pub fn resolved_db_path(&self) -> PathBuf {
        resolve_tilde(&self.db_path)
    }

    /// Get the resolved conversation-log directory
    pub fn resolved_log_dir(&self) -> PathBuf {
        resolve_tilde(&self.log_dir)
    }
}

fn resolve_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}
