//! Diagramação de texto para impressão
//!
//! Recebe texto já composto e devolve páginas prontas. Diretivas aceitas:
//! `<<font:N>>` na primeira linha (corpo 6 a 12), `<<center>>`/`<<right>>`
//! no começo de uma linha, e a linha `<<assinatura>>`, que abre cinco
//! linhas em branco e centraliza as duas linhas seguintes (nome e CRM).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const FONT_DIRECTIVE: &str = "<<font:";
pub const CENTER_DIRECTIVE: &str = "<<center>>";
pub const RIGHT_DIRECTIVE: &str = "<<right>>";
pub const SIGNATURE_MARKER: &str = "<<assinatura>>";

pub const DEFAULT_FONT_SIZE: u32 = 10;
pub const MIN_FONT_SIZE: u32 = 6;
pub const MAX_FONT_SIZE: u32 = 12;

/// Margem fixa em cada lado, em polegadas
pub const MARGIN_INCHES: f64 = 0.5;
const SIGNATURE_GAP_LINES: usize = 5;
const SIGNATURE_LINES: usize = 2;
const FORM_FEED: char = '\u{c}';

/// Erros do driver de impressão
#[derive(Error, Debug)]
pub enum PrintError {
    #[error("Impressora não encontrada: {0}")]
    PrinterNotFound(String),

    #[error("Impressora fora de linha: {0}")]
    PrinterOffline(String),

    #[error("Configuração de página inválida: {0}")]
    InvalidMetrics(String),

    #[error("Erro de E/S na impressão: {0}")]
    Io(#[from] std::io::Error),
}

/// Tamanho da página como o driver informa
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    pub dpi: u32,
    pub width_px: u32,
    pub height_px: u32,
}

impl PageMetrics {
    /// Folha A4 (210 x 297 mm) na resolução dada
    pub fn a4(dpi: u32) -> Self {
        Self {
            dpi,
            width_px: (8.27 * f64::from(dpi)).round() as u32,
            height_px: (11.69 * f64::from(dpi)).round() as u32,
        }
    }

    fn margin_px(&self) -> f64 {
        MARGIN_INCHES * f64::from(self.dpi)
    }

    fn point_px(&self, points: f64) -> f64 {
        points / 72.0 * f64::from(self.dpi)
    }

    /// Caracteres por linha no corpo dado
    pub fn columns(&self, font_size: u32) -> usize {
        let printable = f64::from(self.width_px) - 2.0 * self.margin_px();
        let char_width = self.point_px(0.6 * f64::from(font_size));
        ((printable / char_width).floor() as usize).max(1)
    }

    /// Linhas por página no corpo dado
    pub fn rows(&self, font_size: u32) -> usize {
        let printable = f64::from(self.height_px) - 2.0 * self.margin_px();
        let line_height = self.point_px(1.2 * f64::from(font_size));
        ((printable / line_height).floor() as usize).max(1)
    }

    fn check(&self) -> Result<(), PrintError> {
        let margin = 2.0 * self.margin_px();
        if self.dpi == 0 || f64::from(self.width_px) <= margin || f64::from(self.height_px) <= margin {
            return Err(PrintError::InvalidMetrics(format!("{:?}", self)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub text: String,
    pub align: Align,
}

impl Line {
    fn blank() -> Self {
        Self {
            text: String::new(),
            align: Align::Left,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Page {
    pub lines: Vec<Line>,
}

/// Documento diagramado
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub font_size: u32,
    pub columns: usize,
    pub rows: usize,
    pub pages: Vec<Page>,
}

impl Document {
    /// Texto puro: alinhamento por espaços, páginas separadas por form feed
    pub fn render_text(&self) -> String {
        let pages: Vec<String> = self
            .pages
            .iter()
            .map(|page| {
                page.lines
                    .iter()
                    .map(|line| {
                        let len = line.text.chars().count();
                        let pad = match line.align {
                            Align::Left => 0,
                            Align::Center => self.columns.saturating_sub(len) / 2,
                            Align::Right => self.columns.saturating_sub(len),
                        };
                        format!("{}{}", " ".repeat(pad), line.text)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect();
        pages.join(&FORM_FEED.to_string())
    }
}

/// Tira `<<font:N>>` da linha e devolve o corpo pedido (já limitado)
fn take_font_directive(line: &str) -> (String, Option<u32>) {
    let Some(start) = line.find(FONT_DIRECTIVE) else {
        return (line.to_string(), None);
    };
    let after = &line[start + FONT_DIRECTIVE.len()..];
    let Some(end) = after.find(">>") else {
        return (line.to_string(), None);
    };
    let size = after[..end]
        .trim()
        .parse::<u32>()
        .map(|n| n.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE))
        .unwrap_or(DEFAULT_FONT_SIZE);
    let rest = format!("{}{}", &line[..start], &after[end + 2..]);
    (rest, Some(size))
}

/// Remove diretivas de um texto livre, para que ele saia como digitado
pub fn strip_directives(line: &str) -> String {
    let mut out = line.to_string();
    loop {
        let before = out.len();
        while let (rest, Some(_)) = take_font_directive(&out) {
            out = rest;
        }
        for token in [CENTER_DIRECTIVE, RIGHT_DIRECTIVE, SIGNATURE_MARKER] {
            out = out.replace(token, "");
        }
        // Remoções podem juntar pedaços de uma nova diretiva
        if out.len() == before {
            return out;
        }
    }
}

fn take_alignment(line: &str) -> (&str, Align) {
    if let Some(rest) = line.strip_prefix(CENTER_DIRECTIVE) {
        (rest, Align::Center)
    } else if let Some(rest) = line.strip_prefix(RIGHT_DIRECTIVE) {
        (rest, Align::Right)
    } else {
        (line, Align::Left)
    }
}

/// Quebra por palavras; palavra maior que a linha é cortada
pub fn wrap_line(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        if word.is_empty() {
            continue;
        }
        if current_len > 0 && current_len + 1 + word.len() > max_chars {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

struct Paginator {
    rows: usize,
    pages: Vec<Page>,
}

impl Paginator {
    fn current(&mut self) -> &mut Page {
        if self.pages.last().map_or(true, |p| p.lines.len() >= self.rows) {
            self.pages.push(Page::default());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn remaining(&self) -> usize {
        match self.pages.last() {
            Some(page) if page.lines.len() < self.rows => self.rows - page.lines.len(),
            _ => self.rows,
        }
    }

    fn push(&mut self, line: Line) {
        self.current().lines.push(line);
    }

    fn break_page(&mut self) {
        if self.pages.last().map_or(false, |p| !p.lines.is_empty()) {
            self.pages.push(Page::default());
        }
    }
}

/// Diagrama o texto nas medidas da página
pub fn layout(text: &str, metrics: &PageMetrics) -> Document {
    let mut raw: Vec<String> = text.lines().map(str::to_string).collect();
    let mut font_size = DEFAULT_FONT_SIZE;

    if let Some(first) = raw.first() {
        let (rest, size) = take_font_directive(first);
        if let Some(size) = size {
            font_size = size;
            if rest.trim().is_empty() {
                raw.remove(0);
            } else {
                raw[0] = rest;
            }
        }
    }

    let columns = metrics.columns(font_size);
    let rows = metrics.rows(font_size);
    let mut paginator = Paginator {
        rows,
        pages: Vec::new(),
    };
    let mut centered_left = 0usize;

    for raw_line in &raw {
        if raw_line.trim() == SIGNATURE_MARKER {
            if paginator.remaining() < SIGNATURE_GAP_LINES + SIGNATURE_LINES {
                paginator.break_page();
            }
            for _ in 0..SIGNATURE_GAP_LINES {
                paginator.push(Line::blank());
            }
            centered_left = SIGNATURE_LINES;
            continue;
        }

        let (content, mut align) = take_alignment(raw_line);
        if centered_left > 0 {
            align = Align::Center;
            centered_left -= 1;
        }
        for piece in wrap_line(content, columns) {
            paginator.push(Line { text: piece, align });
        }
    }

    if paginator.pages.is_empty() {
        paginator.pages.push(Page::default());
    }

    debug!(
        font_size,
        columns,
        rows,
        pages = paginator.pages.len(),
        "texto diagramado"
    );

    Document {
        font_size,
        columns,
        rows,
        pages: paginator.pages,
    }
}

/// Situação de uma impressora
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrinterStatus {
    Ready,
    Offline,
}

/// Acesso às impressoras do sistema
pub trait PrinterDriver {
    fn printers(&self) -> Result<Vec<String>, PrintError>;
    fn status(&self, printer: &str) -> Result<PrinterStatus, PrintError>;
    fn metrics(&self, printer: &str) -> Result<PageMetrics, PrintError>;
    /// Envia o documento; devolve um identificador do trabalho
    fn submit(&self, printer: &str, job_name: &str, doc: &Document) -> Result<String, PrintError>;
}

/// Driver de spool em diretório
///
/// Cada subdiretório é uma impressora. Um arquivo `offline` dentro dele a
/// deixa fora de linha; `pagina.json` (opcional) traz as medidas da página.
#[derive(Debug, Clone)]
pub struct SpoolDirDriver {
    root: PathBuf,
    default_dpi: u32,
}

impl SpoolDirDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_dpi: 300,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn printer_dir(&self, printer: &str) -> Result<PathBuf, PrintError> {
        let dir = self.root.join(printer);
        if printer.is_empty() || printer.contains(['/', '\\']) || !dir.is_dir() {
            return Err(PrintError::PrinterNotFound(printer.to_string()));
        }
        Ok(dir)
    }
}

fn job_file_name(job_name: &str) -> String {
    let safe: String = job_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{}.txt", chrono::Local::now().format("%Y%m%d%H%M%S%3f"), safe)
}

impl PrinterDriver for SpoolDirDriver {
    fn printers(&self) -> Result<Vec<String>, PrintError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn status(&self, printer: &str) -> Result<PrinterStatus, PrintError> {
        let dir = self.printer_dir(printer)?;
        if dir.join("offline").exists() {
            Ok(PrinterStatus::Offline)
        } else {
            Ok(PrinterStatus::Ready)
        }
    }

    fn metrics(&self, printer: &str) -> Result<PageMetrics, PrintError> {
        let path = self.printer_dir(printer)?.join("pagina.json");
        if !path.exists() {
            return Ok(PageMetrics::a4(self.default_dpi));
        }
        let content = std::fs::read_to_string(&path)?;
        let metrics: PageMetrics = serde_json::from_str(&content)
            .map_err(|e| PrintError::InvalidMetrics(e.to_string()))?;
        metrics.check()?;
        Ok(metrics)
    }

    fn submit(&self, printer: &str, job_name: &str, doc: &Document) -> Result<String, PrintError> {
        if self.status(printer)? == PrinterStatus::Offline {
            return Err(PrintError::PrinterOffline(printer.to_string()));
        }
        let file = job_file_name(job_name);
        let path = self.printer_dir(printer)?.join(&file);
        std::fs::write(&path, doc.render_text())?;
        Ok(file)
    }
}

/// Diagrama com as medidas da impressora e envia
pub fn print_text<D: PrinterDriver + ?Sized>(
    driver: &D,
    printer: &str,
    job_name: &str,
    text: &str,
) -> Result<Document, PrintError> {
    let metrics = driver.metrics(printer)?;
    let doc = layout(text, &metrics);
    let job = driver.submit(printer, job_name, &doc)?;
    info!(
        "Trabalho {} enviado para {} ({} páginas)",
        job,
        printer,
        doc.pages.len()
    );
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn narrow() -> PageMetrics {
        // 2 polegadas úteis na largura e 1 na altura, a 72 dpi
        PageMetrics {
            dpi: 72,
            width_px: 3 * 72,
            height_px: 2 * 72,
        }
    }

    #[test]
    fn a4_geometry_shrinks_with_font_size() {
        let a4 = PageMetrics::a4(300);
        assert!(a4.columns(6) > a4.columns(12));
        assert!(a4.rows(6) > a4.rows(12));
        assert_eq!(a4.columns(10), 87);
        assert_eq!(a4.rows(10), 64);
    }

    #[test]
    fn font_directive_is_read_and_clamped() {
        assert_eq!(layout("<<font:8>>Olá", &narrow()).font_size, 8);
        assert_eq!(layout("<<font:30>>Olá", &narrow()).font_size, MAX_FONT_SIZE);
        assert_eq!(layout("<<font:2>>Olá", &narrow()).font_size, MIN_FONT_SIZE);
        assert_eq!(layout("<<font:x>>Olá", &narrow()).font_size, DEFAULT_FONT_SIZE);
        assert_eq!(layout("Olá", &narrow()).font_size, DEFAULT_FONT_SIZE);

        let doc = layout("<<font:8>>Olá\nmundo", &narrow());
        assert_eq!(doc.pages[0].lines[0].text, "Olá");

        let doc = layout("<<font:8>>\nmundo", &narrow());
        assert_eq!(doc.pages[0].lines[0].text, "mundo");
    }

    #[test]
    fn font_directive_only_counts_on_first_line() {
        let doc = layout("a\n<<font:6>>b", &narrow());
        assert_eq!(doc.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(doc.pages[0].lines[1].text, "<<font:6>>b");
    }

    #[test]
    fn alignment_directives_are_stripped() {
        let doc = layout("<<center>>Título\n<<right>>Data\ncorpo", &narrow());
        let lines = &doc.pages[0].lines;
        assert_eq!(lines[0], Line { text: "Título".into(), align: Align::Center });
        assert_eq!(lines[1], Line { text: "Data".into(), align: Align::Right });
        assert_eq!(lines[2].align, Align::Left);
    }

    #[test]
    fn words_wrap_and_long_words_split() {
        assert_eq!(wrap_line("um dois tres", 7), vec!["um dois", "tres"]);
        assert_eq!(wrap_line("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_line("a abcdefgh b", 4), vec!["a", "abcd", "efgh", "b"]);
        assert_eq!(wrap_line("", 10), vec![""]);
        assert_eq!(wrap_line("ação ação", 9), vec!["ação ação"]);
    }

    #[test]
    fn pages_break_when_height_runs_out() {
        let metrics = narrow();
        let rows = metrics.rows(DEFAULT_FONT_SIZE);
        let text: Vec<String> = (0..rows * 2 + 1).map(|i| format!("linha {}", i)).collect();
        let doc = layout(&text.join("\n"), &metrics);
        assert_eq!(doc.pages.len(), 3);
        assert!(doc.pages.iter().all(|p| p.lines.len() <= rows));
        assert_eq!(doc.render_text().matches(FORM_FEED).count(), 2);
    }

    #[test]
    fn signature_marker_opens_gap_and_centers_two_lines() {
        let text = "Tomar 1 comprimido\n<<assinatura>>\nDra. Ana\nCRM 123\ndepois";
        let doc = layout(text, &PageMetrics::a4(300));
        let lines = &doc.pages[0].lines;
        assert_eq!(lines.len(), 1 + SIGNATURE_GAP_LINES + 3);
        assert!(lines[1..6].iter().all(|l| l.text.is_empty()));
        assert_eq!(lines[6], Line { text: "Dra. Ana".into(), align: Align::Center });
        assert_eq!(lines[7], Line { text: "CRM 123".into(), align: Align::Center });
        assert_eq!(lines[8].align, Align::Left);
    }

    #[test]
    fn lines_mentioning_crm_are_not_special() {
        let doc = layout("Conselho: crm ativo\nok", &PageMetrics::a4(300));
        assert!(doc.pages[0].lines.iter().all(|l| l.align == Align::Left));
        assert_eq!(doc.pages[0].lines.len(), 2);
    }

    #[test]
    fn signature_block_moves_to_next_page_when_short_of_room() {
        let metrics = PageMetrics {
            height_px: 4 * 72,
            ..narrow()
        };
        let rows = metrics.rows(DEFAULT_FONT_SIZE);
        let mut text: Vec<String> = (0..rows - 2).map(|i| format!("l{}", i)).collect();
        text.push(SIGNATURE_MARKER.to_string());
        text.push("Nome".into());
        text.push("CRM".into());
        let doc = layout(&text.join("\n"), &metrics);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[1].lines.len(), SIGNATURE_GAP_LINES + SIGNATURE_LINES);
    }

    #[test]
    fn free_text_loses_its_directives() {
        assert_eq!(strip_directives("<<center>>Tomar 1"), "Tomar 1");
        assert_eq!(strip_directives(" <<assinatura>> "), "  ");
        assert_eq!(strip_directives("a<<font:12>>b<<right>>c"), "abc");
        assert_eq!(strip_directives("<<cen<<center>>ter>>x"), "x");
        assert_eq!(strip_directives("<<cen<<right>>ter>>x"), "x");
        assert_eq!(strip_directives("sem diretiva"), "sem diretiva");
    }

    #[test]
    fn render_pads_by_alignment() {
        let doc = Document {
            font_size: 10,
            columns: 10,
            rows: 10,
            pages: vec![Page {
                lines: vec![
                    Line { text: "ab".into(), align: Align::Center },
                    Line { text: "ab".into(), align: Align::Right },
                ],
            }],
        };
        assert_eq!(doc.render_text(), "    ab\n        ab");
    }

    #[test]
    fn spool_driver_lists_checks_and_writes() -> Result<(), PrintError> {
        let dir = tempdir()?;
        std::fs::create_dir(dir.path().join("recepcao"))?;
        std::fs::create_dir(dir.path().join("consultorio"))?;
        std::fs::write(dir.path().join("consultorio").join("offline"), "")?;

        let driver = SpoolDirDriver::new(dir.path());
        assert_eq!(driver.printers()?, vec!["consultorio", "recepcao"]);
        assert_eq!(driver.status("recepcao")?, PrinterStatus::Ready);
        assert_eq!(driver.status("consultorio")?, PrinterStatus::Offline);
        assert!(matches!(driver.status("garagem"), Err(PrintError::PrinterNotFound(_))));

        let doc = print_text(&driver, "recepcao", "receita 1", "<<center>>Receita")?;
        assert_eq!(doc.pages.len(), 1);
        let written: Vec<_> = std::fs::read_dir(dir.path().join("recepcao"))?.collect();
        assert_eq!(written.len(), 1);

        assert!(matches!(
            print_text(&driver, "consultorio", "x", "texto"),
            Err(PrintError::PrinterOffline(_))
        ));
        Ok(())
    }

    #[test]
    fn spool_driver_reads_page_metrics() -> Result<(), PrintError> {
        let dir = tempdir()?;
        let printer = dir.path().join("termica");
        std::fs::create_dir(&printer)?;
        std::fs::write(
            printer.join("pagina.json"),
            r#"{"dpi": 203, "width_px": 576, "height_px": 2000}"#,
        )?;

        let driver = SpoolDirDriver::new(dir.path());
        let metrics = driver.metrics("termica")?;
        assert_eq!(metrics.dpi, 203);

        std::fs::write(
            printer.join("pagina.json"),
            r#"{"dpi": 203, "width_px": 100, "height_px": 2000}"#,
        )?;
        assert!(matches!(driver.metrics("termica"), Err(PrintError::InvalidMetrics(_))));
        Ok(())
    }
}
