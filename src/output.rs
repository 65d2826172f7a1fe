use std::str::FromStr;

use colored::Colorize;

use crate::engine::UpdateResult;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Container,
    Status,
    Detail,
    Repository,
    Image,
    Domain,
    Path,
    Tag,
    Update,
}

impl FromStr for Column {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "container" => Ok(Column::Container),
            "status" => Ok(Column::Status),
            "detail" => Ok(Column::Detail),
            "repository" => Ok(Column::Repository),
            "image" => Ok(Column::Image),
            "domain" => Ok(Column::Domain),
            "path" => Ok(Column::Path),
            "tag" => Ok(Column::Tag),
            "update" => Ok(Column::Update),
            _ => Err(AppError::UnknownColumn(s.to_string())),
        }
    }
}

impl Column {
    fn header(&self) -> &'static str {
        match self {
            Column::Container => "Container",
            Column::Status => "Status",
            Column::Detail => "Detail",
            Column::Repository => "Repository",
            Column::Image => "Image",
            Column::Domain => "Domain",
            Column::Path => "Path",
            Column::Tag => "Tag",
            Column::Update => "Update",
        }
    }

    fn value(&self, result: &UpdateResult) -> String {
        match self {
            Column::Container => result.container.clone(),
            Column::Status => result.status.label().to_string(),
            Column::Detail => result.status.detail(),
            Column::Repository => result.repository(),
            Column::Image => result.image(),
            Column::Domain => result.domain.clone(),
            Column::Path => result.path.clone(),
            Column::Tag => result.tag.clone(),
            Column::Update => result.update.clone().unwrap_or_default(),
        }
    }

    fn paint(&self, cell: String, result: &UpdateResult) -> String {
        match self {
            Column::Status if result.status.is_ok() => cell.green().bold().to_string(),
            Column::Status => cell.red().bold().to_string(),
            Column::Detail if !result.status.is_ok() => cell.red().to_string(),
            Column::Update => cell.yellow().bold().to_string(),
            _ => cell,
        }
    }
}

pub fn parse_columns(names: &[String]) -> Result<Vec<Column>, AppError> {
    names.iter().map(|name| name.parse()).collect()
}

/// Render an aligned table, one row per result.
pub fn render_table(results: &[UpdateResult], columns: &[Column], color: bool) -> String {
    if results.is_empty() {
        return "No containers found\n".to_string();
    }

    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|r| columns.iter().map(|c| c.value(r)).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(c.header().len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| {
            let cell = format!("{:<width$}", c.header(), width = *w);
            if color {
                cell.bold().to_string()
            } else {
                cell
            }
        })
        .collect();
    out.push_str(header.join("  ").trim_end());
    out.push('\n');

    for (result, row) in results.iter().zip(rows) {
        let cells: Vec<String> = columns
            .iter()
            .zip(&widths)
            .zip(row)
            .map(|((c, w), value)| {
                let cell = format!("{:<width$}", value, width = *w);
                if color {
                    c.paint(cell, result)
                } else {
                    cell
                }
            })
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

pub fn print_results(results: &[UpdateResult], columns: &[Column]) {
    print!("{}", render_table(results, columns, true));
}

/// Print final summary
pub fn print_summary(results: &[UpdateResult]) {
    if results.is_empty() {
        return;
    }
    let updates = results.iter().filter(|r| r.update.is_some()).count();
    let errors = results.iter().filter(|r| !r.status.is_ok()).count();

    println!(
        "\n{} {} containers, {} updates available, {} errors",
        "SUMMARY:".bold(),
        results.len(),
        if updates > 0 {
            updates.to_string().yellow().bold().to_string()
        } else {
            updates.to_string()
        },
        if errors > 0 {
            errors.to_string().red().bold().to_string()
        } else {
            errors.to_string()
        }
    );
}
