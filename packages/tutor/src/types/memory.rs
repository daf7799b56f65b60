//! Memory types - records, behavioral insights, and user facts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a stored memory record. Immutable after insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Message,
    Summary,
    UserFact,
    Insight,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Message => "message",
            MemoryKind::Summary => "summary",
            MemoryKind::UserFact => "user_fact",
            MemoryKind::Insight => "insight",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "message" => Some(MemoryKind::Message),
            "summary" => Some(MemoryKind::Summary),
            "user_fact" => Some(MemoryKind::UserFact),
            "insight" => Some(MemoryKind::Insight),
            _ => None,
        }
    }
}

/// One remembered item owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub kind: MemoryKind,
    pub content: String,

    /// 768-dim L2-unit embedding
    pub embedding: Vec<f32>,

    /// Importance in [0, 1]
    pub importance: f32,

    #[serde(default)]
    pub metadata: serde_json::Value,

    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    pub fn new(user_id: impl Into<String>, kind: MemoryKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            kind,
            content: content.into(),
            embedding: Vec::new(),
            importance: 0.5,
            metadata: serde_json::Value::Null,
            session_id: None,
            created_at: Utc::now(),
            updated_at: None,
            last_accessed: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// A memory row plus its similarity to the query.
#[derive(Debug, Clone)]
pub struct MemorySearchResult {
    pub record: MemoryRecord,
    pub similarity: f32,
}

/// Category of a behavioral insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    LearningStyle,
    KnowledgeGap,
    GoalEvolution,
    Habit,
    Preference,
}

impl InsightCategory {
    pub const ALL: [InsightCategory; 5] = [
        InsightCategory::LearningStyle,
        InsightCategory::KnowledgeGap,
        InsightCategory::GoalEvolution,
        InsightCategory::Habit,
        InsightCategory::Preference,
    ];

    /// Categories retrieved first during prompt assembly.
    pub const PRIORITY: [InsightCategory; 2] =
        [InsightCategory::KnowledgeGap, InsightCategory::LearningStyle];

    pub fn as_str(&self) -> &'static str {
        match self {
            InsightCategory::LearningStyle => "learning_style",
            InsightCategory::KnowledgeGap => "knowledge_gap",
            InsightCategory::GoalEvolution => "goal_evolution",
            InsightCategory::Habit => "habit",
            InsightCategory::Preference => "preference",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "learning_style" => Some(InsightCategory::LearningStyle),
            "knowledge_gap" => Some(InsightCategory::KnowledgeGap),
            "goal_evolution" => Some(InsightCategory::GoalEvolution),
            "habit" => Some(InsightCategory::Habit),
            "preference" => Some(InsightCategory::Preference),
            _ => None,
        }
    }

    pub fn is_priority(&self) -> bool {
        Self::PRIORITY.contains(self)
    }
}

/// A behavioral insight: a sentence-length statement about *how* a user
/// learns or what they struggle with, never an atomic identity fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Backing memory row, when persisted
    pub id: Option<Uuid>,

    pub user_id: String,
    pub content: String,
    pub category: InsightCategory,
    pub sub_topic: Option<String>,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// Messages this insight was derived from
    #[serde(default)]
    pub source_messages: Vec<String>,

    /// Ordered log of merges and supersessions
    #[serde(default)]
    pub evolution_notes: Vec<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Insight {
    /// Minimum content length for a valid insight.
    pub const MIN_CONTENT_LENGTH: usize = 20;

    pub fn new(
        user_id: impl Into<String>,
        category: InsightCategory,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            content: content.into(),
            category,
            sub_topic: None,
            confidence: 0.8,
            source_messages: Vec::new(),
            evolution_notes: Vec::new(),
            created_at: None,
            last_accessed: None,
        }
    }

    pub fn with_sub_topic(mut self, sub_topic: impl Into<String>) -> Self {
        self.sub_topic = Some(sub_topic.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Metadata payload stored on the backing memory row.
    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "insight_category": self.category.as_str(),
            "sub_topic": self.sub_topic,
            "confidence": self.confidence,
            "source_messages": self.source_messages,
            "evolution_notes": self.evolution_notes,
        })
    }

    /// Rebuild an insight from its backing memory row.
    pub fn from_record(record: &MemoryRecord) -> Option<Self> {
        let category = record
            .metadata
            .get("insight_category")
            .and_then(|v| v.as_str())
            .and_then(InsightCategory::parse)?;

        Some(Self {
            id: Some(record.id),
            user_id: record.user_id.clone(),
            content: record.content.clone(),
            category,
            sub_topic: record
                .metadata
                .get("sub_topic")
                .and_then(|v| v.as_str())
                .map(String::from),
            confidence: record
                .metadata
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.8) as f32,
            source_messages: string_list(&record.metadata, "source_messages"),
            evolution_notes: string_list(&record.metadata, "evolution_notes"),
            created_at: Some(record.created_at),
            last_accessed: record.last_accessed,
        })
    }
}

fn string_list(metadata: &serde_json::Value, key: &str) -> Vec<String> {
    metadata
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Type of an extracted user fact. Six canonical types; deprecated
/// incoming names are mapped at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Name,
    Role,
    Level,
    Goal,
    Preference,
    Weakness,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Name => "name",
            FactType::Role => "role",
            FactType::Level => "level",
            FactType::Goal => "goal",
            FactType::Preference => "preference",
            FactType::Weakness => "weakness",
        }
    }

    /// Parse a fact type, mapping deprecated names to the canonical six.
    ///
    /// Returns `None` for ignored or unknown types.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "name" => Some(FactType::Name),
            "role" | "background" => Some(FactType::Role),
            "level" => Some(FactType::Level),
            "goal" => Some(FactType::Goal),
            "preference" | "interest" | "learning_style" => Some(FactType::Preference),
            "weakness" | "weak_area" => Some(FactType::Weakness),
            _ => None,
        }
    }
}

/// An extracted user fact, upserted per (user, fact_type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFact {
    pub fact_type: FactType,
    pub value: String,
    pub confidence: f32,
    pub source_message: Option<String>,
}

impl UserFact {
    pub fn new(fact_type: FactType, value: impl Into<String>) -> Self {
        Self {
            fact_type,
            value: value.into(),
            confidence: 0.8,
            source_message: None,
        }
    }

    /// Storable content string, e.g. `"name: Minh"`.
    pub fn to_content(&self) -> String {
        format!("{}: {}", self.fact_type.as_str(), self.value)
    }

    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "fact_type": self.fact_type.as_str(),
            "confidence": self.confidence,
            "source_message": self.source_message,
        })
    }
}
