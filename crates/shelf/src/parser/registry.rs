use std::path::PathBuf;
use std::time::Duration;

use crate::config::ParsersConfig;
use crate::error::ParseError;
use crate::parser::{
    detect_format, BookFormat, BookParser, EpubParser, PageRenderer, Parser, PdfParser,
};
use crate::secrets::expand_home;

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub render_pdf_first_page: bool,
    pub render_dpi: u32,
    pub pdftoppm_path: PathBuf,
    pub render_timeout: Duration,
}

impl From<&ParsersConfig> for ParserConfig {
    fn from(config: &ParsersConfig) -> Self {
        Self {
            render_pdf_first_page: config.render_pdf_first_page,
            render_dpi: config.render_dpi,
            pdftoppm_path: PathBuf::from(expand_home(&config.pdftoppm_path)),
            render_timeout: Duration::from_secs(config.render_timeout_secs),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::from(&ParsersConfig::default())
    }
}

/// Maps a file signature to the parser for its format.
#[derive(Debug, Clone)]
pub struct ParserRegistry {
    parsers: Vec<Parser>,
}

impl ParserRegistry {
    pub fn new(config: &ParserConfig) -> Self {
        let renderer = config
            .render_pdf_first_page
            .then(|| {
                PageRenderer::new(config.render_dpi)
                    .with_program(&config.pdftoppm_path)
                    .with_timeout(config.render_timeout)
            });

        Self {
            parsers: vec![
                Parser::Pdf(PdfParser::new(renderer)),
                Parser::Epub(EpubParser::new()),
            ],
        }
    }

    pub fn formats(&self) -> Vec<BookFormat> {
        self.parsers.iter().map(BookParser::format).collect()
    }

    /// Picks a parser from the leading bytes of an upload. See [`detect_format`].
    pub fn resolve(&self, header: &[u8], filename_hint: Option<&str>) -> Result<Parser, ParseError> {
        let format = detect_format(header, filename_hint)?;

        self.parsers
            .iter()
            .find(|p| p.format() == format)
            .cloned()
            .ok_or_else(|| ParseError::UnsupportedFormat(format.to_string()))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new(&ParserConfig::default())
    }
}
