//! CLI 通用输出格式化模块
//!
//! 提供 table/json/yaml 三种输出格式的通用实现

use anyhow::{bail, Result};
use serde::Serialize;

/// 可输出为表格行的数据 trait
pub trait TableRow {
    /// 返回表格列标题
    fn headers() -> Vec<&'static str>;

    /// 返回该项的表格行数据
    fn row(&self) -> Vec<String>;
}

/// 列宽取标题与内容的最大字符数
fn column_widths<T: TableRow>(items: &[T]) -> Vec<usize> {
    let mut widths: Vec<usize> = T::headers().iter().map(|h| h.chars().count()).collect();
    for item in items {
        for (i, cell) in item.row().iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }
    widths
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// 表格文本
pub fn render_table<T: TableRow>(items: &[T]) -> String {
    let widths = column_widths(items);
    let headers: Vec<String> = T::headers().iter().map(|h| h.to_string()).collect();

    let header_line = format_line(&headers, &widths);
    let mut lines = vec![
        header_line.clone(),
        "-".repeat(header_line.chars().count()),
    ];
    lines.extend(items.iter().map(|item| format_line(&item.row(), &widths)));
    lines.join("\n")
}

/// 表格格式输出
pub fn print_table<T: TableRow>(items: &[T]) {
    println!("{}", render_table(items));
}

/// JSON 格式输出
pub fn print_json<T: Serialize>(items: &[T]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(items)?);
    Ok(())
}

/// YAML 格式输出
pub fn print_yaml<T: Serialize>(items: &[T]) -> Result<()> {
    print!("{}", serde_yaml::to_string(items)?);
    Ok(())
}

/// 根据格式参数选择输出方式
pub fn output_formatted<T: TableRow + Serialize>(items: &[T], format: &str) -> Result<()> {
    match format {
        "table" => print_table(items),
        "json" => print_json(items)?,
        "yaml" => print_yaml(items)?,
        other => bail!("不支持的输出格式: {} (table/json/yaml)", other),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row(&'static str, u32);

    impl TableRow for Row {
        fn headers() -> Vec<&'static str> {
            vec!["名称", "次数"]
        }

        fn row(&self) -> Vec<String> {
            vec![self.0.to_string(), self.1.to_string()]
        }
    }

    #[test]
    fn test_render_table() {
        let table = render_table(&[Row("fault_A-B", 3), Row("switching", 12)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "名称         次数");
        assert_eq!(lines[2], "fault_A-B  3");
        assert_eq!(lines[3], "switching  12");
    }
}
