//! Print stylesheet handed to the PDF engine with every render.

/// Page furniture, typography and block layout for the exported report.
///
/// The running header and `Page N of M` footer use CSS paged-media margin
/// boxes, so they only appear in engines that implement them (WeasyPrint
/// does).
pub const PRINT_STYLESHEET: &str = r#"@page {
    size: A4;
    margin: 1cm;
    @top-center {
        content: "ADIME Report";
        font-size: 10pt;
        color: #7f8c8d;
    }
    @bottom-center {
        content: "Page " counter(page) " of " counter(pages);
        font-size: 10pt;
        color: #7f8c8d;
    }
}

body {
    font-family: Arial, Helvetica, sans-serif;
    font-size: 11pt;
    line-height: 1.5;
    color: #333;
}

h1 {
    color: #2c3e50;
    border-bottom: 1px solid #eee;
    padding-bottom: 5px;
}

h2 {
    color: #3498db;
    margin-top: 20px;
    page-break-after: avoid;
}

h3 {
    color: #2c3e50;
    page-break-after: avoid;
}

img {
    max-width: 90%;
    max-height: 9cm;
    height: auto;
    display: block;
    margin: 15px auto;
    border-radius: 5px;
}

.section {
    margin-bottom: 30px;
    page-break-inside: avoid;
}

.action-item {
    background-color: #f9f9f9;
    padding: 15px;
    margin: 15px 0;
    border-left: 4px solid #3498db;
    border-radius: 3px;
    page-break-inside: avoid;
}

.edit-controls,
.no-print {
    display: none;
}
"#;
