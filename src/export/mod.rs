use crate::lookup::types::{LookupResult, PlaceResult};

const CSV_HEADER: &str = "\"Input\",\"Status\",\"Name\",\"Latitude\",\"Longitude\",\"Address\",\"Place ID\",\"Google Maps URL\",\"Error\",\"Suggestions\"";

/// Serializes results as CSV: one row per place for successful queries, one
/// row per failed or empty query. Embedded quotes are doubled.
pub fn to_csv(results: &[LookupResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut lines = vec![CSV_HEADER.to_string()];

    for result in results {
        if let Some(error) = &result.error {
            lines.push(format!(
                "\"{}\",\"Error\",\"\",0,0,\"\",\"\",\"\",\"{}\",\"{}\"",
                escape_quotes(&result.query),
                escape_quotes(&error.message),
                escape_quotes(&error.suggestions.join("; ")),
            ));
        } else if result.results.is_empty() {
            lines.push(format!(
                "\"{}\",\"No Results\",\"\",0,0,\"\",\"\",\"\",\"No results found\",\"Try a different search term\"",
                escape_quotes(&result.query),
            ));
        } else {
            for place in &result.results {
                lines.push(format!(
                    "\"{}\",\"Success\",\"{}\",{},{},\"{}\",{},\"{}\",\"\",\"\"",
                    escape_quotes(&result.query),
                    escape_quotes(place.name.as_deref().unwrap_or("")),
                    place.lat,
                    place.lng,
                    escape_quotes(&place.address),
                    place.place_id,
                    maps_url(place),
                ));
            }
        }
    }

    lines.join("\n")
}

/// Serializes results as pretty-printed JSON, a direct rendering of the
/// result sequence.
pub fn to_json(results: &[LookupResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(results)
}

fn maps_url(place: &PlaceResult) -> String {
    if !place.place_id.is_empty() {
        format!(
            "https://www.google.com/maps/place/?q=place_id:{}",
            place.place_id
        )
    } else {
        format!("https://www.google.com/maps?q={},{}", place.lat, place.lng)
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('"', "\"\"")
}
