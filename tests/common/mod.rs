//! Synthetic PDF fixtures
//!
//! Pages carry incompressible pseudo-random content streams so that page
//! weight survives qpdf's stream compression.

#![allow(dead_code)]

/// Deterministic incompressible bytes
pub fn noise(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

struct PdfBuilder {
    out: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfBuilder {
    fn new() -> Self {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            out,
            offsets: Vec::new(),
        }
    }

    fn object(&mut self, id: usize, body: &[u8]) {
        if self.offsets.len() < id {
            self.offsets.resize(id, 0);
        }
        self.offsets[id - 1] = self.out.len();
        self.out
            .extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        self.out.extend_from_slice(body);
        self.out.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, id: usize, payload: &[u8]) {
        let mut body = format!("<< /Length {} >>\nstream\n", payload.len()).into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\nendstream");
        self.object(id, &body);
    }

    fn finish(mut self) -> Vec<u8> {
        let xref_offset = self.out.len();
        let count = self.offsets.len() + 1;
        self.out
            .extend_from_slice(format!("xref\n0 {}\n", count).as_bytes());
        self.out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in &self.offsets {
            self.out
                .extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        self.out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                count, xref_offset
            )
            .as_bytes(),
        );
        self.out
    }
}

/// Build a PDF with `pages` pages of roughly `page_bytes` each, plus
/// `unreferenced_bytes` of objects nothing points to.
pub fn build_pdf(pages: usize, page_bytes: usize, unreferenced_bytes: usize) -> Vec<u8> {
    let mut pdf = PdfBuilder::new();

    pdf.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 3 + i * 2)).collect();
    pdf.object(
        2,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages
        )
        .as_bytes(),
    );

    for i in 0..pages {
        let page_id = 3 + i * 2;
        let content_id = page_id + 1;
        pdf.object(
            page_id,
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> /Contents {} 0 R >>",
                content_id
            )
            .as_bytes(),
        );
        pdf.stream(content_id, &noise(i as u64 + 1, page_bytes));
    }

    if unreferenced_bytes > 0 {
        pdf.stream(3 + pages * 2, &noise(9999, unreferenced_bytes));
    }

    pdf.finish()
}
