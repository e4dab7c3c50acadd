// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Concierge gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Concierge configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConciergeConfig {
    /// Gateway identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Webhook listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// WhatsApp Cloud API credentials.
    #[serde(default)]
    pub whatsapp: WhatsappConfig,

    /// Microsoft Teams bot registration. Absent disables the channel.
    #[serde(default)]
    pub teams: Option<TeamsConfig>,

    /// AI responder, transcription, and vision endpoints.
    #[serde(default)]
    pub responder: ResponderConfig,

    /// Optional document search used to ground AI replies.
    #[serde(default)]
    pub search: Option<SearchConfig>,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// FAQ categories, phrase lists, and history bounds.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// User-facing canned texts.
    #[serde(default)]
    pub replies: RepliesConfig,

    /// Deadlines for external calls.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Activity trail retention.
    #[serde(default)]
    pub activity: ActivityConfig,

    /// Daily metric rollup settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Per-user worker lanes.
    #[serde(default)]
    pub lanes: LanesConfig,
}

/// Gateway identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs and the startup activity event.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "concierge".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Webhook listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Serve `GET /metrics` in Prometheus text format.
    #[serde(default)]
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            metrics_enabled: false,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

/// WhatsApp Cloud API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsappConfig {
    /// Bearer token for the Graph API. `None` disables the channel.
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub phone_number_id: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_graph_base_url")]
    pub base_url: String,

    /// Token echoed back during the webhook verification handshake.
    #[serde(default)]
    pub verify_token: Option<String>,

    /// App secret used to check `X-Hub-Signature-256`. `None` skips the check.
    #[serde(default)]
    pub app_secret: Option<String>,
}

impl Default for WhatsappConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            api_version: default_api_version(),
            base_url: default_graph_base_url(),
            verify_token: None,
            app_secret: None,
        }
    }
}

fn default_api_version() -> String {
    "v21.0".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

/// Microsoft Teams (Bot Framework) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TeamsConfig {
    /// Bot registration (Microsoft App) id.
    pub app_id: String,

    /// Client secret for the bot registration.
    pub app_password: String,

    /// Tenant used for the client-credentials token request.
    #[serde(default = "default_teams_tenant")]
    pub tenant_id: String,

    #[serde(default = "default_login_base_url")]
    pub login_base_url: String,

    #[serde(default = "default_teams_scope")]
    pub scope: String,

    /// Greeting sent when the bot is added to a conversation. `None` sends nothing.
    #[serde(default)]
    pub welcome_message: Option<String>,
}

impl TeamsConfig {
    pub fn new(app_id: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_password: app_password.into(),
            tenant_id: default_teams_tenant(),
            login_base_url: default_login_base_url(),
            scope: default_teams_scope(),
            welcome_message: None,
        }
    }
}

fn default_teams_tenant() -> String {
    "botframework.com".to_string()
}

fn default_login_base_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_teams_scope() -> String {
    "https://api.botframework.com/.default".to_string()
}

/// OpenAI-compatible responder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResponderConfig {
    /// Base URL up to and including the API version segment.
    #[serde(default = "default_responder_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_vision_model")]
    pub vision_model: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            base_url: default_responder_base_url(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            transcription_model: default_transcription_model(),
            vision_model: default_vision_model(),
        }
    }
}

fn default_responder_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    400
}

fn default_temperature() -> f32 {
    0.4
}

fn default_system_prompt() -> String {
    "Eres el asistente virtual de Novus Soluciones. Responde en espanol, de forma breve y \
     amable. Si no tienes la informacion necesaria, dilo claramente y ofrece contactar con un \
     agente humano."
        .to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Document search endpoint queried before each AI reply.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Search service URL (e.g. `https://<name>.search.windows.net`).
    pub endpoint: String,

    pub index: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Number of documents added to the prompt.
    #[serde(default = "default_search_top")]
    pub top: usize,
}

fn default_search_top() -> usize {
    3
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for concurrent reads.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("concierge").join("concierge.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("concierge.db"))
        .to_string_lossy()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// One FAQ category: first keyword hit wins, in declaration order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FaqCategory {
    pub name: String,
    pub keywords: Vec<String>,
    pub reply: String,
}

impl FaqCategory {
    fn new(name: &str, keywords: &[&str], reply: &str) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            reply: reply.to_string(),
        }
    }
}

/// Routing decisions: FAQ table, phrase lists, and history bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    #[serde(default = "default_faq")]
    pub faq: Vec<FaqCategory>,

    /// Phrases that request a human agent.
    #[serde(default = "default_handoff_phrases")]
    pub handoff_phrases: Vec<String>,

    /// Phrases that lift an escalation hold.
    #[serde(default = "default_resume_phrases")]
    pub resume_phrases: Vec<String>,

    /// Phrases in an AI reply that suggest a human should take over.
    #[serde(default = "default_escalation_indicators")]
    pub escalation_indicators: Vec<String>,

    /// History turns handed to the AI responder.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// History turns captured on a new escalation.
    #[serde(default = "default_excerpt_turns")]
    pub excerpt_turns: usize,

    /// Stored message content is cut to this many characters.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Offset from UTC that defines the business day, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            faq: default_faq(),
            handoff_phrases: default_handoff_phrases(),
            resume_phrases: default_resume_phrases(),
            escalation_indicators: default_escalation_indicators(),
            history_window: default_history_window(),
            excerpt_turns: default_excerpt_turns(),
            max_content_chars: default_max_content_chars(),
            utc_offset_minutes: 0,
        }
    }
}

fn default_faq() -> Vec<FaqCategory> {
    vec![
        FaqCategory::new(
            "horario",
            &["horario", "hora", "atienden", "abierto", "cerrado"],
            "Nuestro horario de atención es de Lunes a Viernes, 8:00 AM - 5:00 PM.\n\n\
             ¿Hay algo más en lo que pueda ayudarle?",
        ),
        FaqCategory::new(
            "servicios",
            &["servicios", "ofrecen", "hacen", "productos"],
            "Novus Soluciones ofrece:\nDesarrollo de software a medida\n\
             Consultoría tecnológica\nSoluciones de inteligencia artificial\n\
             Integración de sistemas empresariales\n\n\
             ¿Le interesa algún servicio en particular?",
        ),
        FaqCategory::new(
            "contacto",
            &["contacto", "teléfono", "telefono", "email", "correo", "llamar"],
            "Puede contactarnos por:\nEmail: info@novuscr.com\nTeléfono: [agregar número]\n\
             Web: www.novuscr.com\n\n¿Prefiere que un agente le contacte?",
        ),
        FaqCategory::new(
            "ubicacion",
            &["ubicación", "ubicacion", "dirección", "direccion", "donde", "oficina"],
            "Estamos ubicados en Costa Rica.\n\
             Para reuniones presenciales, contáctenos para coordinar.\n\n\
             ¿Necesita agendar una cita?",
        ),
        FaqCategory::new(
            "precio",
            &["precio", "costo", "cuanto", "cuánto", "cotización", "cotizacion", "tarifa"],
            "Los precios varían según el proyecto y sus necesidades específicas.\n\n\
             Para una cotización personalizada, un agente puede contactarle.\n\
             ¿Desea que le llamemos?",
        ),
    ]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_handoff_phrases() -> Vec<String> {
    strings(&[
        "hablar con una persona",
        "hablar con alguien",
        "agente humano",
        "representante",
        "operador",
        "persona real",
        "hablar con agente",
    ])
}

fn default_resume_phrases() -> Vec<String> {
    strings(&["volver al bot", "continuar"])
}

fn default_escalation_indicators() -> Vec<String> {
    strings(&[
        "no tengo esa informacion",
        "no tengo informacion",
        "no puedo ayudar",
        "no estoy seguro",
        "no encuentro",
        "no dispongo",
        "contactar con un agente",
        "hablar con una persona",
        "necesitas hablar con",
    ])
}

fn default_history_window() -> usize {
    10
}

fn default_excerpt_turns() -> usize {
    5
}

fn default_max_content_chars() -> usize {
    500
}

/// Canned user-facing texts.
///
/// `{transcript}`, `{caption}`, and `{analysis}` are substituted where noted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepliesConfig {
    /// Sent to a held user who did not ask to return to the bot.
    #[serde(default = "default_hold_notice")]
    pub hold_notice: String,

    #[serde(default = "default_handoff_notice")]
    pub handoff_notice: String,

    #[serde(default = "default_resume_ack")]
    pub resume_ack: String,

    /// Appended to an AI reply that suggested escalation.
    #[serde(default = "default_escalation_invite")]
    pub escalation_invite: String,

    #[serde(default = "default_fallback")]
    pub fallback: String,

    #[serde(default = "default_audio_not_understood")]
    pub audio_not_understood: String,

    /// Prepended to replies for voice notes. Uses `{transcript}`.
    #[serde(default = "default_audio_echo")]
    pub audio_echo: String,

    #[serde(default = "default_audio_download_failed")]
    pub audio_download_failed: String,

    #[serde(default = "default_image_download_failed")]
    pub image_download_failed: String,

    #[serde(default = "default_unsupported")]
    pub unsupported: String,

    /// First line of the synthetic image prompt.
    #[serde(default = "default_image_prompt")]
    pub image_prompt: String,

    /// Uses `{caption}`; omitted when the image has no caption.
    #[serde(default = "default_image_caption")]
    pub image_caption: String,

    /// Uses `{analysis}`.
    #[serde(default = "default_image_analysis")]
    pub image_analysis: String,

    /// Stored as the user turn for images.
    #[serde(default = "default_image_log_marker")]
    pub image_log_marker: String,

    /// Stored before a transcript.
    #[serde(default = "default_audio_log_prefix")]
    pub audio_log_prefix: String,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self {
            hold_notice: default_hold_notice(),
            handoff_notice: default_handoff_notice(),
            resume_ack: default_resume_ack(),
            escalation_invite: default_escalation_invite(),
            fallback: default_fallback(),
            audio_not_understood: default_audio_not_understood(),
            audio_echo: default_audio_echo(),
            audio_download_failed: default_audio_download_failed(),
            image_download_failed: default_image_download_failed(),
            unsupported: default_unsupported(),
            image_prompt: default_image_prompt(),
            image_caption: default_image_caption(),
            image_analysis: default_image_analysis(),
            image_log_marker: default_image_log_marker(),
            audio_log_prefix: default_audio_log_prefix(),
        }
    }
}

fn default_hold_notice() -> String {
    "Ya hemos registrado tu solicitud de atencion con un agente humano.\n\n\
     Un miembro de nuestro equipo te contactara pronto.\n\n\
     Si deseas continuar con el asistente automatico, escribe \"volver al bot\"."
        .to_string()
}

fn default_handoff_notice() -> String {
    "Entendido. Te voy a conectar con un agente humano.\n\n\
     Un miembro de nuestro equipo te contactara en breve.\n\n\
     Horario de atencion: Lunes a Viernes, 8:00 AM - 5:00 PM"
        .to_string()
}

fn default_resume_ack() -> String {
    "Perfecto, continuemos. En que puedo ayudarte?".to_string()
}

fn default_escalation_invite() -> String {
    "\n\nTe gustaria hablar con un agente humano? Responde \"si\" o \"hablar con agente\"."
        .to_string()
}

fn default_fallback() -> String {
    "Lo siento, no pude procesar tu solicitud. Por favor, intentalo de nuevo.".to_string()
}

fn default_audio_not_understood() -> String {
    "Lo siento, no pude entender el audio. Podrias escribir tu mensaje?".to_string()
}

fn default_audio_echo() -> String {
    "Escuche: '{transcript}'\n\n".to_string()
}

fn default_audio_download_failed() -> String {
    "No pude descargar el audio. Por favor, intentalo de nuevo.".to_string()
}

fn default_image_download_failed() -> String {
    "No pude descargar la imagen. Por favor, intentalo de nuevo.".to_string()
}

fn default_unsupported() -> String {
    "Lo siento, solo puedo procesar mensajes de texto, imagenes y audios por ahora.".to_string()
}

fn default_image_prompt() -> String {
    "El usuario envio una imagen por WhatsApp.".to_string()
}

fn default_image_caption() -> String {
    "\n\nMensaje del usuario: '{caption}'".to_string()
}

fn default_image_analysis() -> String {
    "\n\nAnalisis de la imagen:\n{analysis}\n\n\
     Responde de manera util basandote en lo que ves en la imagen."
        .to_string()
}

fn default_image_log_marker() -> String {
    "[User sent an image]".to_string()
}

fn default_audio_log_prefix() -> String {
    "[Audio]: ".to_string()
}

/// Deadlines, in seconds, for each kind of external call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsConfig {
    #[serde(default = "default_responder_secs")]
    pub responder_secs: u64,

    #[serde(default = "default_media_secs")]
    pub speech_secs: u64,

    #[serde(default = "default_media_secs")]
    pub vision_secs: u64,

    #[serde(default = "default_channel_secs")]
    pub channel_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            responder_secs: default_responder_secs(),
            speech_secs: default_media_secs(),
            vision_secs: default_media_secs(),
            channel_secs: default_channel_secs(),
        }
    }
}

fn default_responder_secs() -> u64 {
    45
}

fn default_media_secs() -> u64 {
    30
}

fn default_channel_secs() -> u64 {
    15
}

/// Activity trail retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    /// Oldest events beyond this count are discarded.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Default page size for recent-activity reads.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            recent_limit: default_recent_limit(),
        }
    }
}

fn default_max_entries() -> usize {
    50
}

fn default_recent_limit() -> usize {
    10
}

/// Daily metric rollup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Snapshots older than this many days are pruned.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// How often the background rollup runs.
    #[serde(default = "default_rollup_interval_secs")]
    pub rollup_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            rollup_interval_secs: default_rollup_interval_secs(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_rollup_interval_secs() -> u64 {
    3600
}

/// Per-user worker lane configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LanesConfig {
    /// A lane with nothing queued for this long is closed.
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,

    /// Time allowed for lanes to finish queued work at shutdown.
    #[serde(default = "default_drain_secs")]
    pub drain_secs: u64,
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            idle_secs: default_idle_secs(),
            drain_secs: default_drain_secs(),
        }
    }
}

fn default_idle_secs() -> u64 {
    300
}

fn default_drain_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_faq_keeps_declaration_order() {
        let names: Vec<_> = default_faq().into_iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec!["horario", "servicios", "contacto", "ubicacion", "precio"]
        );
    }

    #[test]
    fn faq_array_replaces_defaults() {
        let toml_str = r#"
[[routing.faq]]
name = "hours"
keywords = ["hours"]
reply = "We open at 9."
"#;
        let config: ConciergeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.routing.faq.len(), 1);
        assert_eq!(config.routing.faq[0].name, "hours");
        assert_eq!(config.routing.history_window, 10);
    }

    #[test]
    fn faq_category_denies_unknown_fields() {
        let toml_str = r#"
[[routing.faq]]
name = "hours"
keywords = ["hours"]
reply = "x"
weight = 3
"#;
        assert!(toml::from_str::<ConciergeConfig>(toml_str).is_err());
    }

    #[test]
    fn search_section_is_optional() {
        let config = ConciergeConfig::default();
        assert!(config.search.is_none());

        let toml_str = r#"
[search]
endpoint = "https://docs.example.net"
index = "kb"
"#;
        let config: ConciergeConfig = toml::from_str(toml_str).unwrap();
        let search = config.search.unwrap();
        assert_eq!(search.index, "kb");
        assert_eq!(search.top, 3);
    }

    #[test]
    fn reply_templates_carry_placeholders() {
        let replies = RepliesConfig::default();
        assert!(replies.audio_echo.contains("{transcript}"));
        assert!(replies.image_caption.contains("{caption}"));
        assert!(replies.image_analysis.contains("{analysis}"));
    }
}
