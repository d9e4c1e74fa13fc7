//! Room reconciliation: matching and merging the two measurement sources.
//!
//! Vision is authoritative when it supplies a usable dimension; OCR fills
//! gaps or corroborates. Reconciliation never fails — unmatched or unparsed
//! tokens are dropped with a note, and identical inputs always produce
//! identical rooms.

use tracing::debug;

use super::dimension::DimensionParser;
use super::types::{
    round2, DimensionSource, DimensionToken, RawTextBlock, RawVisionRoom, ReconciliationConflict,
    Room,
};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub rooms: Vec<Room>,
    pub conflicts: Vec<ReconciliationConflict>,
    pub notes: Vec<String>,
    /// Vision rooms that carried a parseable dimension of their own.
    pub vision_dimensioned: usize,
    /// Dimension tokens parsed out of the OCR blocks.
    pub ocr_token_count: usize,
}

/// Match vision rooms against OCR-derived dimension tokens and merge.
pub fn reconcile(
    vision_rooms: &[RawVisionRoom],
    ocr_blocks: &[RawTextBlock],
    parser: &DimensionParser,
    tolerance_pct: f64,
) -> Reconciliation {
    let ocr_tokens: Vec<DimensionToken> = ocr_blocks
        .iter()
        .flat_map(|block| parser.find_all(&block.text, DimensionSource::Ocr))
        .collect();

    debug!(
        vision_rooms = vision_rooms.len(),
        ocr_tokens = ocr_tokens.len(),
        "Reconciling sources"
    );

    let mut result = Reconciliation {
        ocr_token_count: ocr_tokens.len(),
        ..Default::default()
    };

    if vision_rooms.is_empty() {
        synthesize_from_ocr(&ocr_tokens, &mut result);
        return result;
    }

    // Parse each vision room's own dimension text first.
    let vision_dims: Vec<Option<DimensionToken>> = vision_rooms
        .iter()
        .map(|room| {
            room.dimensions
                .as_deref()
                .and_then(|raw| parser.parse(raw, DimensionSource::Vision))
        })
        .collect();
    result.vision_dimensioned = vision_dims.iter().filter(|d| d.is_some()).count();

    // Greedy matching. Pass 1: labeled OCR tokens attach to a vision room of
    // the same type. Pass 2: remaining tokens fill dimensionless rooms in
    // positional order.
    let mut token_used = vec![false; ocr_tokens.len()];
    let mut matched: Vec<Option<usize>> = vec![None; vision_rooms.len()];

    for (room_idx, room) in vision_rooms.iter().enumerate() {
        let wanted = room.room_type.to_lowercase();
        for (token_idx, token) in ocr_tokens.iter().enumerate() {
            if token_used[token_idx] {
                continue;
            }
            let Some(label) = &token.room_label else {
                continue;
            };
            if label.to_lowercase() == wanted {
                token_used[token_idx] = true;
                matched[room_idx] = Some(token_idx);
                break;
            }
        }
    }

    let mut spare_tokens = (0..ocr_tokens.len())
        .filter(|&i| !token_used[i])
        .collect::<Vec<_>>()
        .into_iter();
    for (room_idx, dim) in vision_dims.iter().enumerate() {
        if dim.is_none() && matched[room_idx].is_none() {
            if let Some(token_idx) = spare_tokens.next() {
                token_used[token_idx] = true;
                matched[room_idx] = Some(token_idx);
            }
        }
    }

    // Merge policy: vision authoritative; OCR fills or validates.
    for (room_idx, room) in vision_rooms.iter().enumerate() {
        let ocr_match = matched[room_idx].map(|i| &ocr_tokens[i]);
        let merged = merge_room(room, vision_dims[room_idx].as_ref(), ocr_match, tolerance_pct, &mut result);
        result.rooms.push(merged);
    }

    let leftover = token_used.iter().filter(|used| !**used).count();
    if leftover > 0 {
        result
            .notes
            .push(format!("{leftover} OCR dimension token(s) had no matching room"));
    }

    result
}

fn merge_room(
    room: &RawVisionRoom,
    vision_dim: Option<&DimensionToken>,
    ocr_match: Option<&DimensionToken>,
    tolerance_pct: f64,
    result: &mut Reconciliation,
) -> Room {
    match (vision_dim, ocr_match) {
        (Some(vision), Some(ocr)) => {
            let vision_area = vision.area();
            let ocr_area = ocr.area();
            let delta_pct = round2((vision_area - ocr_area).abs() / vision_area * 100.0);
            if delta_pct > tolerance_pct {
                // Keep the vision value, surface the OCR alternative.
                result.conflicts.push(ReconciliationConflict {
                    room_type: room.room_type.clone(),
                    vision_area,
                    ocr_area,
                    delta_pct,
                });
                result.notes.push(format!(
                    "{}: vision {vision_area} sqft vs OCR {ocr_area} sqft ({delta_pct}% apart); kept vision",
                    room.room_type
                ));
            }
            Room::with_dimensions(
                room.room_type.clone(),
                room.dimensions.clone(),
                vision.value_a,
                vision.value_b,
                room.features.clone(),
                DimensionSource::Vision,
            )
        }
        (Some(vision), None) => Room::with_dimensions(
            room.room_type.clone(),
            room.dimensions.clone(),
            vision.value_a,
            vision.value_b,
            room.features.clone(),
            DimensionSource::Vision,
        ),
        (None, Some(ocr)) => Room::with_dimensions(
            room.room_type.clone(),
            Some(ocr.raw_text.clone()),
            ocr.value_a,
            ocr.value_b,
            room.features.clone(),
            DimensionSource::Merged,
        ),
        (None, None) => Room::without_dimensions(
            room.room_type.clone(),
            room.features.clone(),
            DimensionSource::Vision,
        ),
    }
}

/// OCR-only path: no vision rooms at all, so rooms are synthesized from the
/// tokens themselves. A recognized label becomes the room type.
fn synthesize_from_ocr(ocr_tokens: &[DimensionToken], result: &mut Reconciliation) {
    for token in ocr_tokens {
        let room_type = token.room_label.clone().unwrap_or_else(|| "Room".to_string());
        result.rooms.push(Room::with_dimensions(
            room_type,
            Some(token.raw_text.clone()),
            token.value_a,
            token.value_b,
            Vec::new(),
            DimensionSource::Ocr,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> DimensionParser {
        DimensionParser::default()
    }

    fn vision_room(room_type: &str, dimensions: Option<&str>) -> RawVisionRoom {
        RawVisionRoom {
            room_type: room_type.to_string(),
            dimensions: dimensions.map(str::to_string),
            features: vec![],
        }
    }

    fn block(text: &str) -> RawTextBlock {
        RawTextBlock {
            text: text.to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn vision_dimension_is_authoritative() {
        let rooms = vec![vision_room("Kitchen", Some("10' x 12'"))];
        let blocks = vec![block("Kitchen 10' x 12'")];
        let result = reconcile(&rooms, &blocks, &parser(), 10.0);

        assert_eq!(result.rooms.len(), 1);
        assert_eq!(result.rooms[0].width_ft, Some(10.0));
        assert_eq!(result.rooms[0].source, DimensionSource::Vision);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.vision_dimensioned, 1);
        assert_eq!(result.ocr_token_count, 1);
    }

    #[test]
    fn ocr_fills_dimensionless_vision_room() {
        let rooms = vec![vision_room("Den", None)];
        let blocks = vec![block("11' x 13'")];
        let result = reconcile(&rooms, &blocks, &parser(), 10.0);

        let room = &result.rooms[0];
        assert_eq!(room.room_type, "Den");
        assert_eq!(room.width_ft, Some(11.0));
        assert_eq!(room.length_ft, Some(13.0));
        assert_eq!(room.source, DimensionSource::Merged);
        assert_eq!(room.dimensions.as_deref(), Some("11' x 13'"));
    }

    #[test]
    fn type_aware_match_beats_positional_order() {
        // The labeled Kitchen token must reach the Kitchen, not the first
        // dimensionless room.
        let rooms = vec![vision_room("Office", None), vision_room("Kitchen", None)];
        let blocks = vec![block("Kitchen 10' x 12'")];
        let result = reconcile(&rooms, &blocks, &parser(), 10.0);

        assert!(result.rooms[0].width_ft.is_none());
        assert_eq!(result.rooms[1].width_ft, Some(10.0));
    }

    #[test]
    fn positional_matching_fills_rooms_in_order() {
        let rooms = vec![
            vision_room("Bedroom 2", None),
            vision_room("Bedroom 3", None),
        ];
        let blocks = vec![block("11' x 10'"), block("12' x 10'")];
        let result = reconcile(&rooms, &blocks, &parser(), 10.0);

        assert_eq!(result.rooms[0].width_ft, Some(11.0));
        assert_eq!(result.rooms[1].width_ft, Some(12.0));
    }

    #[test]
    fn conflict_keeps_vision_and_notes_ocr_alternative() {
        let rooms = vec![vision_room("Living Room", Some("16' x 18'"))];
        // OCR read 14x18 = 252 sqft vs vision 288 sqft: 12.5% apart
        let blocks = vec![block("Living Room 14' x 18'")];
        let result = reconcile(&rooms, &blocks, &parser(), 10.0);

        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.vision_area, 288.0);
        assert_eq!(conflict.ocr_area, 252.0);
        assert!(conflict.delta_pct > 10.0);

        // Vision value kept
        assert_eq!(result.rooms[0].width_ft, Some(16.0));
        assert!(result.notes[0].contains("kept vision"));
    }

    #[test]
    fn close_values_do_not_conflict() {
        let rooms = vec![vision_room("Living Room", Some("16' x 18'"))];
        // 16x17.5 = 280 sqft, 2.8% from 288 — within tolerance
        let blocks = vec![block("Living Room 16' x 17.5'")];
        let result = reconcile(&rooms, &blocks, &parser(), 10.0);
        assert!(result.conflicts.is_empty());
        assert!(result.notes.is_empty());
    }

    #[test]
    fn dimensionless_room_still_emitted() {
        let rooms = vec![
            vision_room("Kitchen", Some("10' x 12'")),
            vision_room("Walk-in Closet", None),
        ];
        let result = reconcile(&rooms, &[], &parser(), 10.0);

        assert_eq!(result.rooms.len(), 2);
        assert!(!result.rooms[1].has_dimensions());
        assert_eq!(result.rooms[1].source, DimensionSource::Vision);
    }

    #[test]
    fn unmatched_tokens_dropped_with_note() {
        let rooms = vec![vision_room("Kitchen", Some("10' x 12'"))];
        let blocks = vec![block("Kitchen 10' x 12'"), block("9' x 9'"), block("8' x 8'")];
        let result = reconcile(&rooms, &blocks, &parser(), 10.0);

        assert_eq!(result.rooms.len(), 1);
        assert!(result
            .notes
            .iter()
            .any(|n| n.contains("no matching room")));
    }

    #[test]
    fn ocr_only_synthesizes_rooms_from_tokens() {
        let blocks = vec![block("Master Bedroom 14' x 12'"), block("10' x 12'")];
        let result = reconcile(&[], &blocks, &parser(), 10.0);

        assert_eq!(result.rooms.len(), 2);
        assert_eq!(result.rooms[0].room_type, "Master Bedroom");
        assert_eq!(result.rooms[0].source, DimensionSource::Ocr);
        assert_eq!(result.rooms[1].room_type, "Room");
        assert_eq!(result.vision_dimensioned, 0);
        assert_eq!(result.ocr_token_count, 2);
    }

    #[test]
    fn unparseable_vision_text_treated_as_dimensionless() {
        let rooms = vec![vision_room("Garage", Some("double bay"))];
        let result = reconcile(&rooms, &[], &parser(), 10.0);
        assert!(!result.rooms[0].has_dimensions());
        assert_eq!(result.vision_dimensioned, 0);
    }

    #[test]
    fn reconciliation_is_deterministic() {
        let rooms = vec![
            vision_room("Master Bedroom", Some("14x12")),
            vision_room("Living Room", None),
            vision_room("Kitchen", Some("10x12")),
        ];
        let blocks = vec![
            block("Master Bedroom 14' x 12'"),
            block("Living Room 16' x 18'"),
            block("Kitchen 10' x 12'"),
        ];
        let first = reconcile(&rooms, &blocks, &parser(), 10.0);
        let second = reconcile(&rooms, &blocks, &parser(), 10.0);
        assert_eq!(first.rooms, second.rooms);
        assert_eq!(first.conflicts, second.conflicts);
    }
}
