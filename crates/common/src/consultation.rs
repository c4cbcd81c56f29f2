//! Consultation and doctor records owned by the CRUD layer.
//!
//! The chat core only ever sees a [`ConsultationId`](crate::ConsultationId);
//! these types describe the boundary it relies on.

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, NaiveDate, Utc},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConsultationStatus {
    #[default]
    #[serde(rename = "pendente")]
    Pending,
    #[serde(rename = "aprovada")]
    Approved,
    #[serde(rename = "rejeitada")]
    Rejected,
    #[serde(rename = "concluida")]
    Completed,
    #[serde(rename = "cancelada")]
    Cancelled,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pendente",
            Self::Approved => "aprovada",
            Self::Rejected => "rejeitada",
            Self::Completed => "concluida",
            Self::Cancelled => "cancelada",
        }
    }

    /// Rejected, completed and cancelled consultations accept no further
    /// status changes.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pendente" => Ok(Self::Pending),
            "aprovada" => Ok(Self::Approved),
            "rejeitada" => Ok(Self::Rejected),
            "concluida" => Ok(Self::Completed),
            "cancelada" => Ok(Self::Cancelled),
            other => Err(format!("invalid consultation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "paciente")]
    pub patient_id: String,
    #[serde(rename = "medico")]
    pub doctor_id: String,
    #[serde(rename = "horario")]
    pub scheduled_at: DateTime<Utc>,
    #[serde(rename = "especialidade")]
    pub specialty: String,
    #[serde(default)]
    pub status: ConsultationStatus,
    #[serde(rename = "dataCriacao")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "laudoUrl", default)]
    pub report_url: Option<String>,
}

/// Doctor record as far as scheduling is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "especialidade")]
    pub specialty: String,
    /// Days the doctor does not attend, serialized as `YYYY-MM-DD`.
    #[serde(rename = "diasIndisponiveis", default)]
    pub unavailable_dates: Vec<NaiveDate>,
}

impl Doctor {
    pub fn is_available_on(&self, date: NaiveDate) -> bool {
        !self.unavailable_dates.contains(&date)
    }
}
