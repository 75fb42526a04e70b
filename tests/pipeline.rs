use docmerge::{
    BatchRequest, DocMerge, DocMergeError, OutputFormat, PAGE_DELIMITER, PageFooterSpec,
    PageModel, Row, generate_batch, generate_batch_with, rows_from_json, write_archive,
};
use std::io::{Cursor, Read};

fn page_text(bytes: &[u8], page: u32) -> String {
    let pdf = lopdf::Document::load_mem(bytes).expect("load pdf");
    let pages = pdf.get_pages();
    let id = pages.get(&page).copied().expect("page");
    String::from_utf8_lossy(&pdf.get_page_content(id).expect("content")).into_owned()
}

fn page_count(bytes: &[u8]) -> usize {
    lopdf::Document::load_mem(bytes).expect("load pdf").get_pages().len()
}

fn zip_entry(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).expect("zip");
    let mut out = String::new();
    archive
        .by_name(name)
        .expect("entry")
        .read_to_string(&mut out)
        .expect("read entry");
    out
}

#[test]
fn template_pages_become_pdf_pages_with_row_values() {
    let engine = DocMerge::builder().build().expect("build");
    let template = PageModel::split(&format!(
        "<p>Hello {{Name}}</p>{}<p>Balance {{Amount}}</p>",
        PAGE_DELIMITER
    ));
    let row = Row::new().with("Name", "Ada").with("Amount", 42.0);
    let pdf = engine.render_pdf(template.pages(), &row).expect("pdf");

    assert_eq!(page_count(&pdf), 2);
    assert!(page_text(&pdf, 1).contains("(Hello Ada) Tj"));
    assert!(page_text(&pdf, 2).contains("(Balance 42) Tj"));
}

#[test]
fn unknown_placeholders_are_left_in_place() {
    let engine = DocMerge::builder().build().expect("build");
    let pages = vec!["<p>Dear {Title} {Name}</p>".to_string()];
    let row = Row::new().with("Name", "Ada");
    let pdf = engine.render_pdf(&pages, &row).expect("pdf");
    assert!(page_text(&pdf, 1).contains("(Dear {Title} Ada) Tj"));
}

#[test]
fn long_content_overflows_without_crossing_the_bottom_margin() {
    let engine = DocMerge::builder().build().expect("build");
    let body: String = (0..120).map(|i| format!("<p>Paragraph number {}</p>", i)).collect();
    let (pdf, metrics) = engine
        .render_pdf_with_metrics(&[body], &Row::new())
        .expect("pdf");

    assert!(metrics.overflow_breaks > 0);
    assert_eq!(metrics.boundary_breaks, 0);
    assert_eq!(page_count(&pdf), metrics.page_count());
    let page_height = engine.page_size().height.to_f32();
    let bottom_limit = page_height - 20.0 * 72.0 / 25.4;
    for page in &metrics.pages {
        let bottom = page.max_text_bottom.expect("text on every page");
        assert!(bottom <= bottom_limit + 0.01, "page {} reached {}", page.page_number, bottom);
    }
}

#[test]
fn footer_numbers_every_page() {
    let engine = DocMerge::builder()
        .footer(PageFooterSpec::new("Page {page} of {pages}"))
        .build()
        .expect("build");
    let template = PageModel::from_pages(["<p>One</p>", "<p>Two</p>"]);
    let pdf = engine.render_pdf(template.pages(), &Row::new()).expect("pdf");
    assert!(page_text(&pdf, 1).contains("(Page 1 of 2) Tj"));
    assert!(page_text(&pdf, 2).contains("(Page 2 of 2) Tj"));
}

#[test]
fn docx_output_keeps_text_and_page_breaks() {
    let engine = DocMerge::builder().build().expect("build");
    let template = PageModel::from_pages(["<h1>Welcome {Name}</h1>", "<p>Second page</p>"]);
    let row = Row::new().with("Name", "Ada");
    let docx = engine.render_docx(template.pages(), &row).expect("docx");

    let xml = zip_entry(&docx, "word/document.xml");
    assert!(xml.contains("Welcome Ada"));
    assert!(xml.contains("Second page"));
    assert!(xml.contains(r#"w:type="page""#));
}

#[test]
fn batch_archive_names_each_row_and_dedupes() {
    let engine = DocMerge::builder().build().expect("build");
    let rows = rows_from_json(
        r#"[
            {"Name": "Ada", "City": "London"},
            {"Name": "Ada", "City": "Paris"},
            {"City": "Rome"}
        ]"#,
    )
    .expect("rows");
    let template = PageModel::split("<p>{Name} from {City}</p>");
    let request = BatchRequest {
        format: OutputFormat::Pdf,
        pattern: Some("{Name}".to_string()),
        ..BatchRequest::default()
    };
    let mut progress = Vec::new();
    let report = generate_batch(&engine, &rows, &template, &request, |p| progress.push(p.current), || false);

    assert_eq!(report.generated(), 3);
    assert!(!report.cancelled);
    assert_eq!(progress, vec![1, 2, 3]);
    assert_eq!(report.outcomes[2].filename(), "document_0003.pdf");

    let archive = write_archive(&report, Cursor::new(Vec::new())).expect("archive");
    let archive = zip::ZipArchive::new(Cursor::new(archive.into_inner())).expect("zip");
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort();
    assert_eq!(names, vec!["Ada.pdf", "Ada_2.pdf", "document_0003.pdf"]);
}

#[test]
fn cancelled_batch_keeps_processed_rows() {
    let engine = DocMerge::builder().build().expect("build");
    let rows: Vec<Row> = (0..5).map(|i| Row::new().with("N", i as i64)).collect();
    let template = PageModel::split("<p>{N}</p>");
    let mut polls = 0;
    let report = generate_batch(
        &engine,
        &rows,
        &template,
        &BatchRequest::default(),
        |_| {},
        || {
            polls += 1;
            polls > 2
        },
    );
    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 2);
}

#[test]
fn docx_batch_uses_docx_extension() {
    let engine = DocMerge::builder().build().expect("build");
    let rows = vec![Row::new().with("Name", "Ada")];
    let template = PageModel::split("<p>{Name}</p>");
    let request = BatchRequest {
        format: OutputFormat::Docx,
        pattern: Some("Letter {Name}".to_string()),
        ..BatchRequest::default()
    };
    let report = generate_batch(&engine, &rows, &template, &request, |_| {}, || false);
    assert_eq!(report.outcomes[0].filename(), "Letter_Ada.docx");
}

#[test]
fn unreachable_image_still_yields_a_pdf() {
    let engine = DocMerge::builder().build().expect("build");
    let pages = vec![
        r#"<p>Before</p><img src="http://127.0.0.1:9/missing.png"><p>After</p>"#.to_string(),
    ];
    let (pdf, metrics) = engine
        .render_pdf_with_metrics(&pages, &Row::new())
        .expect("pdf");

    assert!(pdf.starts_with(b"%PDF-"));
    assert_eq!(page_count(&pdf), 1);
    let text = page_text(&pdf, 1);
    assert!(text.contains("(Before) Tj"));
    assert!(text.contains("(After) Tj"));
    assert_eq!(metrics.images_drawn, 0);
    assert_eq!(metrics.images_skipped, 1);
}

#[test]
fn one_failing_row_leaves_the_rest_in_the_archive() {
    let engine = DocMerge::builder().build().expect("build");
    let rows = rows_from_json(
        r#"[{"Name": "Ada"}, {"Name": ""}, {"Name": "Grace"}]"#,
    )
    .expect("rows");
    let template = PageModel::split("<p>Dear {Name}</p>");
    let request = BatchRequest {
        pattern: Some("{Name}".to_string()),
        ..BatchRequest::default()
    };
    let report = generate_batch_with(
        &rows,
        &template,
        &request,
        |pages, row, format| match row.display("Name").as_deref() {
            Some("") | None => Err(DocMergeError::Layout("row has no name".to_string())),
            _ => engine.render(pages, row, format),
        },
        |_| {},
        || false,
    );
    assert_eq!(report.generated(), 2);
    assert_eq!(report.failed(), 1);

    let archive = write_archive(&report, Cursor::new(Vec::new())).expect("archive");
    let bytes = archive.into_inner();
    let mut names: Vec<String> = zip::ZipArchive::new(Cursor::new(bytes.clone()))
        .expect("zip")
        .file_names()
        .map(str::to_string)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Ada.pdf", "FAILED.txt", "Grace.pdf"]);

    let manifest = zip_entry(&bytes, "FAILED.txt");
    assert!(manifest.starts_with("row 2\t"));
    assert!(manifest.contains("row has no name"));

    let mut grace = Vec::new();
    zip::ZipArchive::new(Cursor::new(bytes))
        .expect("zip")
        .by_name("Grace.pdf")
        .expect("entry")
        .read_to_end(&mut grace)
        .expect("read");
    assert!(page_text(&grace, 1).contains("(Dear Grace) Tj"));
}

#[test]
fn oversized_text_stays_above_the_bottom_margin() {
    let engine = DocMerge::builder().build().expect("build");
    let pages = vec![r#"<p style="font-size: 900pt">X</p>"#.to_string()];
    let (_, metrics) = engine
        .render_pdf_with_metrics(&pages, &Row::new())
        .expect("pdf");
    let bottom_limit = engine.page_size().height.to_f32() - 20.0 * 72.0 / 25.4;
    for page in &metrics.pages {
        let bottom = page.max_text_bottom.expect("text");
        assert!(bottom <= bottom_limit + 0.01, "page {} bottom {} > {}", page.page_number, bottom, bottom_limit);
    }
}
