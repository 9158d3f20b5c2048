//! Report markup: [`AdimeDocument`] + illustrations → HTML fragment.
//!
//! The fragment is what a clinician previews and edits before export, and
//! what [`crate::pipeline::assets::AssetResolver`] cleans up for the PDF
//! engine. All document text is HTML-escaped; nothing from the note is ever
//! emitted as markup.

use crate::schema::{AdimeDocument, ImageInfo};
use std::fmt::Write as _;

/// Rendering switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Add `contenteditable` regions and an editing toolbar. The toolbar is
    /// marked `edit-controls` so it never reaches the PDF.
    pub editable: bool,
}

/// Escape text for use in element content or a quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render the report fragment.
///
/// `images[i]` illustrates action item `i`; items past the end of `images`
/// are rendered without a picture.
pub fn render_report(doc: &AdimeDocument, images: &[ImageInfo], options: ReportOptions) -> String {
    let mut r = Renderer {
        out: String::with_capacity(4096),
        editable: options.editable,
    };

    r.out.push_str("<div class=\"adime-report\">\n");
    if options.editable {
        r.toolbar();
    }
    r.out.push_str("<h1>My Nutrition Plan</h1>\n");

    let a = &doc.assessment;
    r.open_section("assessment", "Assessment");
    r.paragraph(&a.summary);
    r.labelled("Weight", a.weight.as_deref());
    if let Some(ref labs) = a.labs {
        r.list("Lab results", labs);
    }
    r.labelled("Current intake", a.current_intake.as_deref());
    r.close_section();

    let d = &doc.diagnosis;
    r.open_section("diagnosis", "Diagnosis");
    r.paragraph(&d.summary);
    r.list("Nutrition problems", &d.problems);
    r.close_section();

    let i = &doc.intervention;
    r.open_section("intervention", "Intervention");
    r.paragraph(&i.summary);
    for (idx, item) in i.action_items.iter().enumerate() {
        r.out.push_str("<div class=\"action-item\">\n");
        let _ = writeln!(r.out, "<h3>{}</h3>", escape_html(&item.title));
        r.paragraph(&item.description);
        if let Some(image) = images.get(idx) {
            let _ = writeln!(
                r.out,
                "<img src=\"{}\" alt=\"{}\">",
                escape_html(&image.image_path),
                escape_html(&item.title)
            );
        }
        r.out.push_str("</div>\n");
    }
    r.close_section();

    let m = &doc.monitoring;
    r.open_section("monitoring", "Monitoring &amp; Evaluation");
    r.paragraph(&m.follow_up);
    if let Some(ref metrics) = m.metrics {
        r.list("How we will measure progress", metrics);
    }
    r.labelled("Timeline", m.timeline.as_deref());
    r.close_section();

    r.out.push_str("</div>\n");
    r.out
}

struct Renderer {
    out: String,
    editable: bool,
}

impl Renderer {
    fn editable_attr(&self) -> &'static str {
        if self.editable {
            " contenteditable=\"true\""
        } else {
            ""
        }
    }

    fn toolbar(&mut self) {
        self.out.push_str("<div class=\"edit-controls\">\n");
        for (action, label) in [("bold", "Bold"), ("italic", "Italic"), ("undo", "Undo")] {
            let _ = writeln!(
                self.out,
                "<button type=\"button\" data-action=\"{action}\">{label}</button>"
            );
        }
        self.out.push_str("</div>\n");
    }

    /// `heading` is trusted markup.
    fn open_section(&mut self, id: &str, heading: &str) {
        let _ = writeln!(self.out, "<div class=\"section\" id=\"{id}\">\n<h2>{heading}</h2>");
    }

    fn close_section(&mut self) {
        self.out.push_str("</div>\n");
    }

    fn paragraph(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let body = escape_html(text).replace('\n', "<br>\n");
        let _ = writeln!(self.out, "<p{}>{}</p>", self.editable_attr(), body);
    }

    fn labelled(&mut self, label: &str, value: Option<&str>) {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return;
        };
        let _ = writeln!(
            self.out,
            "<p{}><strong>{}:</strong> {}</p>",
            self.editable_attr(),
            label,
            escape_html(value)
        );
    }

    fn list(&mut self, heading: &str, items: &[String]) {
        if items.is_empty() {
            return;
        }
        let _ = writeln!(self.out, "<h3>{heading}</h3>\n<ul{}>", self.editable_attr());
        for item in items {
            let _ = writeln!(self.out, "<li>{}</li>", escape_html(item));
        }
        self.out.push_str("</ul>\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ActionItem;

    fn sample() -> AdimeDocument {
        let mut doc = AdimeDocument::default();
        doc.assessment.summary = "BMI 31 & rising <fast>".into();
        doc.assessment.labs = Some(vec!["HbA1c 7.9%".into()]);
        doc.diagnosis.problems = vec!["Sugary drinks".into()];
        for t in ["Swap soda", "Add veg"] {
            doc.intervention.action_items.push(ActionItem {
                title: t.into(),
                description: format!("I will {t}"),
                ..Default::default()
            });
        }
        doc.monitoring.follow_up = "4 weeks".into();
        doc
    }

    #[test]
    fn text_is_escaped() {
        let html = render_report(&sample(), &[], ReportOptions::default());
        assert!(html.contains("BMI 31 &amp; rising &lt;fast&gt;"));
        assert!(!html.contains("<fast>"));
    }

    #[test]
    fn one_section_per_part() {
        let html = render_report(&sample(), &[], ReportOptions::default());
        assert_eq!(html.matches("class=\"section\"").count(), 4);
        assert_eq!(html.matches("class=\"action-item\"").count(), 2);
        assert!(html.contains("<li>HbA1c 7.9%</li>"));
    }

    #[test]
    fn images_match_items_by_position() {
        let images = vec![ImageInfo {
            title: "Swap soda".into(),
            description: "I will Swap soda".into(),
            image_path: "/static/generated_images/a.png".into(),
        }];
        let html = render_report(&sample(), &images, ReportOptions::default());
        assert_eq!(html.matches("<img ").count(), 1);
        let img = html.find("a.png").unwrap();
        let second_item = html.find("<h3>Add veg</h3>").unwrap();
        assert!(img < second_item);
    }

    #[test]
    fn editable_adds_toolbar_and_regions() {
        let plain = render_report(&sample(), &[], ReportOptions::default());
        assert!(!plain.contains("contenteditable"));
        assert!(!plain.contains("<button"));

        let html = render_report(&sample(), &[], ReportOptions { editable: true });
        assert!(html.contains("class=\"edit-controls\""));
        assert!(html.contains("contenteditable=\"true\""));
    }

    #[test]
    fn empty_document_still_has_sections() {
        let html = render_report(&AdimeDocument::default(), &[], ReportOptions::default());
        assert_eq!(html.matches("class=\"section\"").count(), 4);
        assert!(!html.contains("<p>"));
    }
}
