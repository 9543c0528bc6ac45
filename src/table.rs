use std::collections::HashMap;

/// Rows of one source file, keyed by the file's own (cleaned) header names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// First header matching any of `names`, in the order given.
    pub fn find_column(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.column_index(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|values| values.get(column))
            .map(String::as_str)
    }

    /// Appends a column holding the same value on every row.
    pub fn with_constant_column(mut self, name: &str, value: &str) -> Self {
        match self.column_index(name) {
            Some(index) => {
                for row in &mut self.rows {
                    if let Some(cell) = row.get_mut(index) {
                        *cell = value.to_string();
                    }
                }
            }
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.to_string());
                }
            }
        }
        self
    }

    /// Stacks tables vertically over the union of their headers.
    ///
    /// Header order follows first appearance; cells a table lacks are empty.
    pub fn concat(tables: Vec<RawTable>) -> RawTable {
        let mut headers: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for table in &tables {
            for header in &table.headers {
                if !positions.contains_key(header) {
                    positions.insert(header.clone(), headers.len());
                    headers.push(header.clone());
                }
            }
        }

        let total = tables.iter().map(RawTable::len).sum();
        let mut rows = Vec::with_capacity(total);
        for table in tables {
            let mapping: Vec<usize> = table
                .headers
                .iter()
                .map(|header| positions[header])
                .collect();
            for row in table.rows {
                let mut merged = vec![String::new(); headers.len()];
                for (value, target) in row.into_iter().zip(&mapping) {
                    merged[*target] = value;
                }
                rows.push(merged);
            }
        }

        RawTable { headers, rows }
    }
}

/// Strips enclosing brackets and whitespace: `" [Campo] "` becomes `"Campo"`.
pub fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .chars()
        .filter(|ch| *ch != '[' && *ch != ']')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Index of the first line, within `scan_lines`, that contains any of `markers`.
pub fn locate_header_line(text: &str, markers: &[&str], scan_lines: usize) -> Option<usize> {
    text.lines()
        .take(scan_lines)
        .position(|line| markers.iter().any(|marker| line.contains(marker)))
}

/// Picks the delimiter that occurs most often on `line`; ties favour the comma.
pub fn infer_delimiter(line: &str) -> u8 {
    let candidates = [b',', b';', b'\t'];
    let mut best = b',';
    let mut best_count = 0usize;
    for candidate in candidates {
        let count = line.bytes().filter(|byte| *byte == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Byte offset at which line number `line` begins.
pub fn line_offset(text: &str, line: usize) -> usize {
    if line == 0 {
        return 0;
    }
    text.match_indices('\n')
        .nth(line - 1)
        .map(|(index, _)| index + 1)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_header_strips_brackets() {
        assert_eq!(clean_header("[Campo]"), "Campo");
        assert_eq!(clean_header("  [Produção de Óleo (m³)] "), "Produção de Óleo (m³)");
        assert_eq!(clean_header("\u{feff}[Ano]"), "Ano");
    }

    #[test]
    fn locate_header_skips_banner() {
        let text = "Agência Nacional do Petróleo\n\nPoço;Campo;Ano\n";
        assert_eq!(locate_header_line(text, &["Campo"], 100), Some(2));
        assert_eq!(locate_header_line(text, &["Campo"], 2), None);
        assert_eq!(&text[line_offset(text, 2)..], "Poço;Campo;Ano\n");
    }

    #[test]
    fn infer_delimiter_counts_separators() {
        assert_eq!(infer_delimiter("a;b;c,d"), b';');
        assert_eq!(infer_delimiter("a,b,c"), b',');
        assert_eq!(infer_delimiter("abc"), b',');
    }

    #[test]
    fn concat_unions_headers() {
        let mut first = RawTable::new(vec!["Poço".into(), "Ano".into()]);
        first.rows.push(vec!["A".into(), "2020".into()]);
        let mut second = RawTable::new(vec!["Ano".into(), "Campo".into()]);
        second.rows.push(vec!["2021".into(), "X".into()]);

        let merged = RawTable::concat(vec![first, second]);
        assert_eq!(merged.headers, vec!["Poço", "Ano", "Campo"]);
        assert_eq!(merged.rows[0], vec!["A", "2020", ""]);
        assert_eq!(merged.rows[1], vec!["", "2021", "X"]);
        assert_eq!(merged.cell(1, 2), Some("X"));
        assert_eq!(merged.cell(2, 0), None);
    }

    #[test]
    fn constant_column_is_appended() {
        let mut table = RawTable::new(vec!["Poço".into()]);
        table.rows.push(vec!["A".into()]);
        let tagged = table.with_constant_column("Environment", "onshore");
        assert_eq!(tagged.headers, vec!["Poço", "Environment"]);
        assert_eq!(tagged.cell(0, 1), Some("onshore"));
    }
}
