//! Column detection for runs of multi-fragment lines.

use super::grouper::Line;
use crate::config::LayoutConfig;

/// Cells of a detected table, in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableGrid {
    /// Left edge of each column cluster.
    pub columns: Vec<f64>,
    pub rows: Vec<Vec<String>>,
}

impl TableGrid {
    /// Render as a markdown pipe table; the first row becomes the header.
    pub fn to_markdown(&self) -> String {
        let width = self.columns.len();
        let render = |row: &[String]| {
            let cells: Vec<String> = (0..width)
                .map(|i| row.get(i).map(|c| c.replace('|', "\\|")).unwrap_or_default())
                .collect();
            format!("| {} |", cells.join(" | "))
        };

        let mut out = Vec::with_capacity(self.rows.len() + 1);
        if let Some((header, body)) = self.rows.split_first() {
            out.push(render(header));
            out.push(format!("|{}|", vec![" --- "; width].join("|")));
            for row in body {
                out.push(render(row));
            }
        }
        out.join("\n")
    }
}

/// Try to read `lines` as a table; `None` when the columns are not consistent.
pub fn detect_table(lines: &[Line], config: &LayoutConfig) -> Option<TableGrid> {
    let min_rows = config.table_min_rows.max(2);
    if lines.len() < min_rows {
        return None;
    }

    let columns = cluster_columns(lines, config.table_column_cluster_gap);
    if columns.len() < 2 || columns.len() > config.table_max_columns {
        return None;
    }

    // Every column boundary must be used by at least `min_rows` rows.
    let mut support = vec![0usize; columns.len()];
    for line in lines {
        let mut hit = vec![false; columns.len()];
        for fragment in &line.fragments {
            hit[column_of(&columns, fragment.bbox.x0)] = true;
        }
        for (count, used) in support.iter_mut().zip(hit) {
            if used {
                *count += 1;
            }
        }
    }
    if support.iter().any(|&s| s < min_rows) {
        return None;
    }

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(lines.len());
    for line in lines {
        let mut cells = vec![String::new(); columns.len()];
        for fragment in &line.fragments {
            let cell = &mut cells[column_of(&columns, fragment.bbox.x0)];
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(fragment.text.trim());
        }
        if cells.iter().any(|c| !c.is_empty()) {
            rows.push(cells);
        }
    }
    if rows.len() < min_rows {
        return None;
    }

    let cell_count = rows.len() * columns.len();
    let total_len: usize = rows.iter().flatten().map(|c| c.chars().count()).sum();
    if total_len as f64 / cell_count as f64 > config.table_max_avg_cell_len {
        return None;
    }

    // A header made of long phrases is wrapped prose, not a table.
    let long_header_cells = rows[0].iter().filter(|c| c.chars().count() > 20).count();
    if long_header_cells >= 2 {
        return None;
    }

    Some(TableGrid { columns, rows })
}

/// Cluster fragment start positions; a new column opens when a start is
/// further than `gap` from the current column's left edge.
fn cluster_columns(lines: &[Line], gap: f64) -> Vec<f64> {
    let mut xs: Vec<f64> = lines
        .iter()
        .flat_map(|l| l.fragments.iter().map(|f| f.bbox.x0))
        .collect();
    xs.sort_by(f64::total_cmp);

    let mut columns: Vec<f64> = Vec::new();
    for x in xs {
        match columns.last() {
            Some(&start) if x - start <= gap => {}
            _ => columns.push(x),
        }
    }
    columns
}

fn column_of(columns: &[f64], x: f64) -> usize {
    columns.iter().rposition(|&c| c <= x).unwrap_or(0)
}
