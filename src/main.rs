//! certforge – command-line front end for the certificate store and renderer.
//!
//! Usage:
//!   certforge render <id> [--out DIR] [--layout layout.json]
//!   certforge render --record record.json [--out DIR] [--layout layout.json]
//!   certforge create <draft.json> [--photo photo.jpg]
//!   certforge list
//!   certforge show <id>
//!   certforge update <id> <patch.json>
//!   certforge delete <id>
//!   certforge template [output.pdf]
//!
//! Configuration comes from the environment (or `.env`): `CERTFORGE_PUBLIC_DIR`,
//! `CERTFORGE_STORE_DIR`, `CERTFORGE_VERIFY_ORIGIN`.

use std::{env, fs, path::Path, path::PathBuf, process};

use certforge::assets::AssetPaths;
use certforge::config::AppConfig;
use certforge::layout_config::CertificateLayout;
use certforge::pipeline::{deliver, fetch_for_render, Compositor};
use certforge::record::{CertificateRecord, RecordPatch};
use certforge::store::{CertificateService, LocalStore, RecordStore, Upload};
use certforge::templates::blank_template;
use certforge::StoreError;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("certforge");

    let mut positional: Vec<String> = Vec::new();
    let mut out_dir: Option<PathBuf> = None;
    let mut layout_path: Option<PathBuf> = None;
    let mut record_path: Option<PathBuf> = None;
    let mut photo_path: Option<PathBuf> = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--out" | "-o" => out_dir = Some(flag_value(prog, arg, iter.next())),
            "--layout" | "-l" => layout_path = Some(flag_value(prog, arg, iter.next())),
            "--record" | "-r" => record_path = Some(flag_value(prog, arg, iter.next())),
            "--photo" | "-p" => photo_path = Some(flag_value(prog, arg, iter.next())),
            "--help" | "-h" => {
                print_usage(prog);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(prog);
                process::exit(1);
            }
            value => positional.push(value.to_string()),
        }
    }

    let Some((command, rest)) = positional.split_first() else {
        print_usage(prog);
        process::exit(1);
    };

    let config = AppConfig::from_env();
    let store = match config.open_store() {
        Ok(store) => store,
        Err(e) => fail(&format!("Error opening store: {e}")),
    };

    match command.as_str() {
        "template" => {
            let output = rest
                .first()
                .map(PathBuf::from)
                .unwrap_or_else(|| config.public_dir.join("templates/certificate.pdf"));
            write_file(&output, &blank_template(612.0, 792.0));
        }
        "render" => {
            let record = match (&record_path, rest.first()) {
                (Some(path), _) => read_record(path),
                (None, Some(id)) => {
                    match fetch_for_render(store.as_ref().map(|s| s as &dyn RecordStore), id) {
                        Ok(record) => record,
                        Err(e) => fail(&format!("Error: {e}")),
                    }
                }
                (None, None) => {
                    eprintln!("Error: render needs a certificate id or --record.");
                    print_usage(prog);
                    process::exit(1);
                }
            };
            let layout = match &layout_path {
                Some(path) => match CertificateLayout::from_json(&read_text(path)) {
                    Ok(layout) => layout,
                    Err(e) => fail(&format!("Error parsing layout '{}': {e}", path.display())),
                },
                None => CertificateLayout::default(),
            };

            let compositor = Compositor::new(
                config.assets(store.as_ref()),
                AssetPaths::default(),
                layout,
            );
            let out_dir = out_dir.unwrap_or_else(|| PathBuf::from("."));
            let mut exit_code = 0;
            compositor.run(&record, |result| match result {
                Ok(output) => {
                    for skipped in &output.report.skipped {
                        eprintln!("Skipped {:?} image: {}", skipped.source, skipped.reason);
                    }
                    match deliver(output, &out_dir) {
                        Ok(path) => eprintln!(
                            "Wrote '{}' ({} bytes)",
                            path.display(),
                            output.bytes.len()
                        ),
                        Err(e) => {
                            eprintln!("Error writing PDF: {e}");
                            exit_code = 1;
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error generating PDF: {e}");
                    exit_code = 1;
                }
            });
            process::exit(exit_code);
        }
        "create" => {
            let store = require_store(store.as_ref());
            let path = record_path
                .or_else(|| rest.first().map(PathBuf::from))
                .unwrap_or_else(|| fail("Error: create needs a draft record JSON file."));
            let draft: CertificateRecord = match serde_json::from_str(&read_text(&path)) {
                Ok(draft) => draft,
                Err(e) => fail(&format!("Error parsing '{}': {e}", path.display())),
            };
            let photo = photo_path.map(|p| read_upload(&p));

            let service = CertificateService::new(store, config.verify_origin.clone());
            match service.create(draft, photo) {
                Ok(record) => println!("{}", record.to_json()),
                Err(e) => fail(&format!("Error: {e}")),
            }
        }
        "list" => {
            let store = require_store(store.as_ref());
            for record in store.list_all() {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.id,
                    record.certificate_number,
                    record.name,
                    record.created_at.as_deref().unwrap_or("")
                );
            }
        }
        "show" => {
            let store = require_store(store.as_ref());
            let id = rest
                .first()
                .unwrap_or_else(|| fail("Error: show needs a certificate id."));
            match store.get_by_id(id) {
                Some(record) => println!("{}", record.to_json()),
                None => fail(&format!("Error: certificate {id} not found")),
            }
        }
        "update" => {
            let store = require_store(store.as_ref());
            let (Some(id), Some(patch_path)) = (rest.first(), rest.get(1)) else {
                fail("Error: update needs a certificate id and a patch JSON file.");
            };
            let patch: RecordPatch = match serde_json::from_str(&read_text(Path::new(patch_path))) {
                Ok(patch) => patch,
                Err(e) => fail(&format!("Error parsing '{patch_path}': {e}")),
            };
            match store.update(id, &patch) {
                Some(record) => println!("{}", record.to_json()),
                None => fail(&format!("Error: could not update certificate {id}")),
            }
        }
        "delete" => {
            let store = require_store(store.as_ref());
            let id = rest
                .first()
                .unwrap_or_else(|| fail("Error: delete needs a certificate id."));
            let service = CertificateService::new(store, config.verify_origin.clone());
            if !service.delete(id) {
                fail(&format!("Error: could not delete certificate {id}"));
            }
            eprintln!("Deleted {id}");
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn flag_value(prog: &str, flag: &str, value: Option<&String>) -> PathBuf {
    match value {
        Some(v) => PathBuf::from(v),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(1);
}

fn require_store(store: Option<&LocalStore>) -> &LocalStore {
    match store {
        Some(store) => store,
        None => fail(&format!(
            "Error: {} (set CERTFORGE_STORE_DIR)",
            StoreError::Unavailable
        )),
    }
}

fn read_text(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => fail(&format!("Error reading '{}': {e}", path.display())),
    }
}

fn read_record(path: &Path) -> CertificateRecord {
    match CertificateRecord::from_json(&read_text(path)) {
        Ok(record) => record,
        Err(e) => fail(&format!("Error in record '{}': {e}", path.display())),
    }
}

fn read_upload(path: &Path) -> Upload {
    let text_or_bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => fail(&format!("Error reading '{}': {e}", path.display())),
    };
    if text_or_bytes.starts_with(b"data:") {
        let uri = String::from_utf8_lossy(&text_or_bytes);
        return match Upload::from_data_uri(uri.trim()) {
            Ok(upload) => upload,
            Err(e) => fail(&format!("Error in '{}': {e}", path.display())),
        };
    }
    let content_type = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Upload {
        bytes: text_or_bytes,
        content_type,
    }
}

fn write_file(output: &Path, bytes: &[u8]) {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                fail(&format!("Error creating output directory: {e}"));
            }
        }
    }
    if let Err(e) = fs::write(output, bytes) {
        fail(&format!("Error writing '{}': {e}", output.display()));
    }
    eprintln!("Wrote '{}' ({} bytes)", output.display(), bytes.len());
}

fn print_usage(prog: &str) {
    eprintln!("certforge – health certificate store and PDF renderer");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} render <id> [--out DIR] [--layout layout.json]");
    eprintln!("  {prog} render --record record.json [--out DIR] [--layout layout.json]");
    eprintln!("  {prog} create <draft.json> [--photo photo.jpg]");
    eprintln!("  {prog} list");
    eprintln!("  {prog} show <id>");
    eprintln!("  {prog} update <id> <patch.json>");
    eprintln!("  {prog} delete <id>");
    eprintln!("  {prog} template [output.pdf]");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --out, -o      Output directory for rendered PDFs (default: .)");
    eprintln!("  --layout, -l   Layout JSON overriding the stock anchors");
    eprintln!("  --record, -r   Record JSON file instead of a stored id");
    eprintln!("  --photo, -p    Photo file (or file holding a data: URI) for create");
    eprintln!("  --help         Print this message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CERTFORGE_PUBLIC_DIR     Public assets root (default: public)");
    eprintln!("  CERTFORGE_STORE_DIR      Record store directory (unset: no store)");
    eprintln!("  CERTFORGE_VERIFY_ORIGIN  Origin for QR verification links");
}
