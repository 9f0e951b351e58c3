use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;

use crate::db::Database;
use crate::models::{Activity, Card, Meeting, StatusHistoryEntry};

#[derive(Serialize)]
pub struct ExportedCard {
    #[serde(flatten)]
    pub card: Card,
    pub status_history: Vec<StatusHistoryEntry>,
    pub activities: Vec<Activity>,
}

#[derive(Serialize)]
pub struct ExportedMeeting {
    #[serde(flatten)]
    pub meeting: Meeting,
    pub cards: Vec<ExportedCard>,
}

#[derive(Serialize)]
pub struct ExportData {
    pub version: i32,
    pub exported_at: String,
    pub meetings: Vec<ExportedMeeting>,
}

fn export_meeting(db: &Database, meeting: Meeting) -> Result<ExportedMeeting> {
    let cards = db
        .list_cards(Some(meeting.id), None, None)?
        .into_iter()
        .map(|card| {
            let status_history = db.get_status_history(card.id)?;
            let activities = db.get_activities(card.id)?;
            Ok(ExportedCard {
                card,
                status_history,
                activities,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ExportedMeeting { meeting, cards })
}

pub fn run(db: &Database, output_path: Option<&str>) -> Result<()> {
    let meetings = db
        .list_meetings()?
        .into_iter()
        .map(|m| export_meeting(db, m))
        .collect::<Result<Vec<_>>>()?;

    let data = ExportData {
        version: 1,
        exported_at: chrono::Utc::now().to_rfc3339(),
        meetings,
    };

    let json = serde_json::to_string_pretty(&data)?;

    match output_path {
        Some(path) => {
            fs::write(path, json).context("Failed to write export file")?;
            println!("Exported to {}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}
