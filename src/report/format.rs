//! Sheets `batchUpdate` style requests for a written report.

use serde_json::{Value, json};

use super::table::{DEVICES_LABEL, EXPECTED_HEADER, RESULTS_SECTION_TITLE, ReportTable, WIDE_DEPTH_HEADER};

const HEADER_DARK: (f64, f64, f64) = (0.2, 0.2, 0.2);
const SUB_GREY: (f64, f64, f64) = (0.9, 0.9, 0.9);
const HEADER_GREY: (f64, f64, f64) = (0.95, 0.95, 0.95);
const WHITE: (f64, f64, f64) = (1.0, 1.0, 1.0);
const PASS_GREEN: (f64, f64, f64) = (0.6, 0.9, 0.6);
const FAIL_RED: (f64, f64, f64) = (0.9, 0.6, 0.6);

/// Column widths in pixels
const NO_WIDTH: u32 = 100;
const CATEGORY_WIDTH: u32 = 200;
const WIDE_DEPTH_WIDTH: u32 = 123;
const EXPECTED_WIDTH: u32 = 482;

fn color((red, green, blue): (f64, f64, f64)) -> Value {
    json!({ "red": red, "green": green, "blue": blue })
}

fn grid(sheet_id: i64, rows: (usize, usize), cols: (usize, usize)) -> Value {
    json!({
        "sheetId": sheet_id,
        "startRowIndex": rows.0,
        "endRowIndex": rows.1,
        "startColumnIndex": cols.0,
        "endColumnIndex": cols.1,
    })
}

fn repeat_cell(range: Value, format: Value, fields: &str) -> Value {
    json!({
        "repeatCell": {
            "range": range,
            "cell": { "userEnteredFormat": format },
            "fields": format!("userEnteredFormat({})", fields),
        }
    })
}

fn column_width(sheet_id: i64, column: usize, pixels: u32) -> Value {
    json!({
        "updateDimensionProperties": {
            "range": { "sheetId": sheet_id, "dimension": "COLUMNS", "startIndex": column, "endIndex": column + 1 },
            "properties": { "pixelSize": pixels },
            "fields": "pixelSize",
        }
    })
}

fn merge_row(sheet_id: i64, row: usize) -> Value {
    json!({
        "mergeCells": {
            "range": grid(sheet_id, (row, row + 1), (0, 2)),
            "mergeType": "MERGE_ALL",
        }
    })
}

/// Style requests for the detail table and the summary block.
///
/// `detail_header_index` is the 0-based row of the detail header.
pub fn style_requests(
    sheet_id: i64,
    table: &ReportTable,
    summary_rows: &[Vec<String>],
    detail_header_index: usize,
) -> Vec<Value> {
    let width = table.width();
    let data = (detail_header_index + 1, detail_header_index + 1 + table.rows.len());
    let results = (table.result_columns.start, table.result_columns.end);
    let mut requests = Vec::new();

    // detail table
    requests.push(repeat_cell(
        grid(sheet_id, data, (0, width)),
        json!({ "verticalAlignment": "TOP", "wrapStrategy": "WRAP" }),
        "verticalAlignment,wrapStrategy",
    ));
    requests.push(repeat_cell(
        grid(sheet_id, (detail_header_index, detail_header_index + 1), (0, width)),
        json!({
            "horizontalAlignment": "CENTER",
            "verticalAlignment": "MIDDLE",
            "textFormat": { "bold": true },
            "backgroundColor": color(HEADER_GREY),
        }),
        "horizontalAlignment,verticalAlignment,textFormat,backgroundColor",
    ));

    requests.push(column_width(sheet_id, 0, NO_WIDTH));
    requests.push(column_width(sheet_id, 1, CATEGORY_WIDTH));
    if let Some(col) = table.column(WIDE_DEPTH_HEADER) {
        requests.push(column_width(sheet_id, col, WIDE_DEPTH_WIDTH));
    }
    if let Some(col) = table.column(EXPECTED_HEADER) {
        requests.push(column_width(sheet_id, col, EXPECTED_WIDTH));
    }

    if results.0 < results.1 {
        requests.push(repeat_cell(
            grid(sheet_id, data, results),
            json!({ "horizontalAlignment": "CENTER", "verticalAlignment": "MIDDLE" }),
            "horizontalAlignment,verticalAlignment",
        ));
        for (text, bg) in [("FAIL", FAIL_RED), ("PASS", PASS_GREEN)] {
            requests.push(json!({
                "addConditionalFormatRule": {
                    "rule": {
                        "ranges": [grid(sheet_id, data, results)],
                        "booleanRule": {
                            "condition": { "type": "TEXT_EQ", "values": [{ "userEnteredValue": text }] },
                            "format": { "backgroundColor": color(bg) },
                        },
                    },
                    "index": 0,
                }
            }));
        }
    }

    // summary block
    let summary_len = summary_rows.len();
    let section = summary_rows
        .iter()
        .position(|row| row.first().map(String::as_str) == Some(RESULTS_SECTION_TITLE));

    requests.push(merge_row(sheet_id, 0));
    if let Some(idx) = section {
        requests.push(merge_row(sheet_id, idx));
    }

    requests.push(repeat_cell(
        grid(sheet_id, (1, summary_len), (0, 1)),
        json!({
            "backgroundColor": color(SUB_GREY),
            "textFormat": { "bold": true },
            "horizontalAlignment": "CENTER",
            "verticalAlignment": "MIDDLE",
        }),
        "backgroundColor,textFormat,horizontalAlignment,verticalAlignment",
    ));
    requests.push(repeat_cell(
        grid(sheet_id, (1, summary_len), (1, 2)),
        json!({ "horizontalAlignment": "CENTER", "verticalAlignment": "MIDDLE" }),
        "horizontalAlignment,verticalAlignment",
    ));
    for (idx, row) in summary_rows.iter().enumerate() {
        if row.first().map(String::as_str) == Some(DEVICES_LABEL) {
            requests.push(repeat_cell(
                grid(sheet_id, (idx, idx + 1), (1, 2)),
                json!({ "horizontalAlignment": "LEFT", "verticalAlignment": "MIDDLE" }),
                "horizontalAlignment,verticalAlignment",
            ));
        }
    }

    let title_format = json!({
        "backgroundColor": color(HEADER_DARK),
        "horizontalAlignment": "CENTER",
        "textFormat": { "foregroundColor": color(WHITE), "bold": true },
    });
    for idx in std::iter::once(0).chain(section) {
        requests.push(repeat_cell(
            grid(sheet_id, (idx, idx + 1), (0, 2)),
            title_format.clone(),
            "backgroundColor,horizontalAlignment,textFormat",
        ));
    }

    let solid = json!({ "style": "SOLID" });
    requests.push(repeat_cell(
        grid(sheet_id, (0, summary_len), (0, 2)),
        json!({ "borders": { "top": solid, "bottom": solid, "left": solid, "right": solid } }),
        "borders",
    ));

    requests
}

/// Freeze every row through the detail header
pub fn freeze_request(sheet_id: i64, frozen_rows: usize) -> Value {
    json!({
        "updateSheetProperties": {
            "properties": { "sheetId": sheet_id, "gridProperties": { "frozenRowCount": frozen_rows } },
            "fields": "gridProperties.frozenRowCount",
        }
    })
}
