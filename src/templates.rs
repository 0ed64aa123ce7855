//! Sample assets for testing and demonstration: a blank certificate
//! template and the reference certificate record.

use printpdf::*;

use crate::record::CertificateRecord;

/// Points to millimetres.
const PT_TO_MM: f32 = 0.352778;

/// A one-page blank certificate template of the given size (points).
///
/// The page carries a teal frame, a heading and thin rules under the field
/// rows, so overlays are easy to eyeball. The real template is a designed
/// PDF; this one exists so the pipeline can run without it.
pub fn blank_template(width_pt: f32, height_pt: f32) -> Vec<u8> {
    let mut ops = Vec::new();

    let teal = Color::Rgb(Rgb {
        r: 0.055,
        g: 0.447,
        b: 0.439,
        icc_profile: None,
    });

    // Frame.
    let inset = 18.0;
    ops.push(Op::SetOutlineColor { col: teal.clone() });
    ops.push(Op::SetOutlineThickness { pt: Pt(2.0) });
    ops.push(Op::DrawLine {
        line: polyline(
            &[
                (inset, inset),
                (width_pt - inset, inset),
                (width_pt - inset, height_pt - inset),
                (inset, height_pt - inset),
            ],
            true,
        ),
    });

    // Field rules, one per text row on the stock layout.
    ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
    for row_in in [8.76_f32, 8.0, 7.24, 6.48] {
        let y = row_in * 72.0 - 4.0;
        ops.push(Op::DrawLine {
            line: polyline(&[(2.2 * 72.0, y), (width_pt - 0.3 * 72.0, y)], false),
        });
    }

    // Heading.
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point {
            x: Pt(inset + 18.0),
            y: Pt(height_pt - inset - 30.0),
        },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(16.0),
        font: BuiltinFont::HelveticaBold,
    });
    ops.push(Op::SetFillColor { col: teal });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text("Health Certificate".to_string())],
        font: BuiltinFont::HelveticaBold,
    });
    ops.push(Op::EndTextSection);

    let mut doc = PdfDocument::new("Health Certificate");
    let page = PdfPage::new(Mm(width_pt * PT_TO_MM), Mm(height_pt * PT_TO_MM), ops);
    doc.with_pages(vec![page]);
    doc.save(&PdfSaveOptions::default(), &mut Vec::new())
}

fn polyline(points: &[(f32, f32)], is_closed: bool) -> Line {
    Line {
        points: points
            .iter()
            .map(|&(x, y)| LinePoint {
                p: Point { x: Pt(x), y: Pt(y) },
                bezier: false,
            })
            .collect(),
        is_closed,
    }
}

/// The reference record: every drawn field filled, Taif logo, no photo or
/// QR URL.
pub fn sample_record() -> CertificateRecord {
    CertificateRecord {
        id: "00000000-0000-4000-8000-000000000001".to_string(),
        name: "Ahmed Ali".to_string(),
        id_number: "1234567890".to_string(),
        certificate_number: "CERT-001".to_string(),
        issue_date: "1445/01/01".to_string(),
        profession: "Chef".to_string(),
        nationality: "Saudi".to_string(),
        expiry_date: "1446/01/01".to_string(),
        program_type: "Food Safety".to_string(),
        program_end_date: "1447/01/01".to_string(),
        thelogo: "Taif.jpg".to_string(),
        ..CertificateRecord::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_template_is_a_pdf() {
        let bytes = blank_template(612.0, 792.0);
        assert_eq!(&bytes[0..5], b"%PDF-");
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn sample_record_is_valid() {
        let record = sample_record();
        record.check().unwrap();
        assert_eq!(record.output_file_name(), "Ahmed Ali.pdf");
        assert!(record.photo_url.is_none() && record.qr_code_url.is_none());
    }
}
