use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use parking_lot::Mutex;

/// Browser user-agent substrings recognized as "this came from a web
/// browser, not an NTRIP client" (spec.md §4.6, reproduced verbatim from
/// `examples/original_source/ntripcaster/src/client.c`'s `is_browser`).
const BROWSER_TOKENS: &[&str] =
    &["Mozilla", "Chrome", "Safari", "Firefox", "Edge", "Opera", "Internet Explorer", "MSIE"];

/// True when `user_agent` contains (case-insensitively) any browser token.
pub fn is_browser(user_agent: Option<&str>) -> bool {
    let Some(agent) = user_agent else { return false };
    let agent = agent.to_ascii_lowercase();
    BROWSER_TOKENS.iter().any(|token| agent.contains(&token.to_ascii_lowercase()))
}

/// The caster's parsed sourcetable file (spec.md §6): `STR`/`CAS`/`NET`
/// records plus any free-form informational lines, in file order.
#[derive(Debug, Clone, Default)]
pub struct Sourcetable {
    lines: Vec<String>,
}

impl Sourcetable {
    pub fn parse(text: &str) -> Self {
        Self { lines: text.lines().map(str::to_string).collect() }
    }

    fn records(&self, tag: &str) -> impl Iterator<Item = &str> {
        self.lines.iter().filter(move |line| line.starts_with(tag)).map(String::as_str)
    }

    fn info_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|line| !(line.starts_with("STR") || line.starts_with("CAS") || line.starts_with("NET")))
            .map(String::as_str)
    }

    /// The filtered NTRIP body: `STR` lines each `\r\n`-terminated, then
    /// the `ENDSOURCETABLE\r\n` sentinel. `Content-Length` is this body's
    /// byte length, computed by the caller from the same string.
    fn ntrip_body(&self) -> String {
        let mut body = String::new();
        for line in self.records("STR") {
            body.push_str(line);
            body.push_str("\r\n");
        }
        body.push_str("ENDSOURCETABLE\r\n");
        body
    }

    /// The mountpoint named by each `STR` record's second field, in file
    /// order — the catalog of streams a source registry is expected to
    /// back.
    pub fn mountpoints(&self) -> Vec<String> {
        self.records("STR")
            .filter_map(|line| line.split(';').nth(1))
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Holds the caster's current sourcetable file, reloadable the same way
/// `AclStore` reloads the mount ACLs (spec.md §6, "File location": "both
/// are reloaded on demand when their mtime exceeds the last-rehash
/// timestamp").
#[derive(Default)]
pub struct SourcetableStore {
    inner: Mutex<(Option<Sourcetable>, SystemTime)>,
}

impl SourcetableStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new((None, SystemTime::UNIX_EPOCH)) }
    }

    pub fn reload_from_file(&self, path: &Path) -> io::Result<()> {
        let text = fs::read_to_string(path)?;
        let mut inner = self.inner.lock();
        inner.0 = Some(Sourcetable::parse(&text));
        inner.1 = SystemTime::now();
        Ok(())
    }

    pub fn rehash_if_stale(&self, path: &Path) -> io::Result<bool> {
        let mtime = fs::metadata(path)?.modified()?;

        let is_stale = {
            let inner = self.inner.lock();
            mtime > inner.1
        };

        if is_stale {
            self.reload_from_file(path)?;
        }

        Ok(is_stale)
    }

    /// Run `f` with the currently loaded sourcetable, or `None` if none has
    /// been loaded (or the configured file is absent).
    pub fn with_current<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&Sourcetable>) -> R,
    {
        let inner = self.inner.lock();
        f(inner.0.as_ref())
    }
}

/// Build the NTRIP-client plain-text sourcetable response (spec.md §4.6,
/// "NTRIP client response"). When no sourcetable is loaded, the body is the
/// single line `NO SOURCETABLE AVAILABLE` and no `Content-Length` header is
/// emitted.
pub fn ntrip_response(sourcetable: Option<&Sourcetable>, server_software: &str) -> String {
    let mut out = format!("SOURCETABLE 200 OK\r\nServer: {server_software}\r\n");

    match sourcetable {
        Some(table) => {
            let body = table.ntrip_body();
            out.push_str("Content-Type: text/plain\r\n");
            let _ = write!(out, "Content-Length: {}\r\n\r\n", body.len());
            out.push_str(&body);
        }
        None => out.push_str("\r\nNO SOURCETABLE AVAILABLE\r\n"),
    }

    out
}

/// Everything the HTML renderer needs that isn't in the sourcetable file
/// itself (spec.md §4.6, "header block: server name, listen port, version,
/// current time"). `now` is supplied by the caller rather than read from
/// the wall clock here, so this module stays a pure function of its input.
pub struct RenderContext<'a> {
    pub server_name: &'a str,
    pub port: u16,
    pub version: &'a str,
    pub ntrip_version: &'a str,
    pub now: &'a str,
}

/// Build the browser HTML sourcetable response (spec.md §4.6, "Browser
/// response"). Field layout (11/8/18 dedicated columns + a joined "Misc"
/// column) is reproduced from `send_html_sourcetable` in
/// `examples/original_source/ntripcaster/src/client.c`.
pub fn html_response(sourcetable: Option<&Sourcetable>, ctx: &RenderContext) -> String {
    let mut body = String::new();

    body.push_str("<!DOCTYPE html>\n<html>\n<head>\n<title>NTRIP Caster - Source Table</title>\n");
    body.push_str("<style>\n");
    body.push_str("body { font-family: Arial, sans-serif; margin: 20px; }\n");
    body.push_str("h1, h2 { color: #333; }\n");
    body.push_str("table { border-collapse: collapse; width: 100%; margin-top: 20px; margin-bottom: 30px; }\n");
    body.push_str("th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }\n");
    body.push_str("th { background-color: #f2f2f2; font-weight: bold; }\n");
    body.push_str("tr:nth-child(even) { background-color: #f9f9f9; }\n");
    body.push_str(".info { background-color: #e7f3ff; padding: 10px; border-radius: 5px; margin-bottom: 20px; }\n");
    body.push_str(".misc-info { background-color: #f0f0f0; padding: 10px; border-radius: 5px; margin-bottom: 20px; }\n");
    body.push_str("</style>\n</head>\n<body>\n");

    body.push_str("<div class=\"info\">\n<h1>NTRIP Caster Source Table</h1>\n");
    let _ = write!(body, "<p><strong>Server:</strong> {}</p>\n", escape(ctx.server_name));
    let _ = write!(body, "<p><strong>Port:</strong> {}</p>\n", ctx.port);
    let _ = write!(
        body,
        "<p><strong>Version:</strong> {}/{}</p>\n",
        escape(ctx.version),
        escape(ctx.ntrip_version)
    );
    let _ = write!(body, "<p><strong>Time:</strong> {}</p>\n", escape(ctx.now));
    body.push_str("</div>\n");

    match sourcetable {
        Some(table) => {
            body.push_str("<div class=\"misc-info\">\n<h2>General Information</h2>\n");
            for line in table.info_lines() {
                let _ = write!(body, "<pre>{}</pre>\n", escape(line));
            }
            body.push_str("</div>\n");

            render_table(
                &mut body,
                "Casters (CAS)",
                &["Type", "Host", "Port", "Identifier", "Operator", "NMEA", "Country", "Latitude", "Longitude", "Fallback Host", "Fallback Port"],
                table.records("CAS"),
            );
            render_table(
                &mut body,
                "Networks (NET)",
                &["Type", "Identifier", "Operator", "Authentication", "Fee", "Web Net", "Web Str", "Web Reg"],
                table.records("NET"),
            );
            render_table(
                &mut body,
                "Data Streams (STR)",
                &[
                    "Type", "Mountpoint", "Identifier", "Format", "Format Details", "Carrier", "Nav System",
                    "Network", "Country", "Latitude", "Longitude", "NMEA", "Solution", "Generator",
                    "Compr Encryp", "Authentication", "Fee", "Bitrate",
                ],
                table.records("STR"),
            );
        }
        None => body.push_str("<p><strong>No sourcetable available</strong></p>\n"),
    }

    body.push_str(
        "<div><p><strong>Note:</strong> This source table has been returned as an HTML page \
         because you requested it using a web browser rather than an NTRIP client.</p></div>\n",
    );
    body.push_str("</body>\n</html>\n");

    format!(
        "HTTP/1.0 200 OK\r\nServer: {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n{}",
        escape_header(ctx.server_name),
        body
    )
}

fn render_table<'a>(out: &mut String, title: &str, columns: &[&str], rows: impl Iterator<Item = &'a str>) {
    let _ = write!(out, "<h2>{title}</h2>\n<table>\n<thead>\n<tr>\n");
    for column in columns {
        let _ = write!(out, "<th>{column}</th>");
    }
    out.push_str("\n</tr>\n</thead>\n<tbody>\n");

    for row in rows {
        let fields: Vec<&str> = row.split(';').collect();
        out.push_str("<tr>");

        for i in 0..columns.len() {
            match fields.get(i).filter(|f| !f.is_empty()) {
                Some(value) => {
                    let _ = write!(out, "<td>{}</td>", escape(value));
                }
                None => out.push_str("<td>-</td>"),
            }
        }

        out.push_str("<td>");
        if fields.len() > columns.len() {
            let misc: Vec<&str> = fields[columns.len()..].iter().filter(|f| !f.is_empty()).copied().collect();
            out.push_str(&escape(&misc.join("; ")));
        } else {
            out.push('-');
        }
        out.push_str("</td></tr>\n");
    }

    out.push_str("</tbody>\n</table>\n");
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_header(value: &str) -> String {
    value.replace(['\r', '\n'], "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_detection_matches_known_tokens() {
        assert!(is_browser(Some("Mozilla/5.0 (Macintosh)")));
        assert!(is_browser(Some("some client using msie compat")));
        assert!(!is_browser(Some("NTRIP Client/1.0")));
        assert!(!is_browser(None));
    }

    #[test]
    fn ntrip_body_filters_to_str_lines_only() {
        let table = Sourcetable::parse("CAS;host;2101;id\nSTR;MOUNT1;ident;RTCM\nNET;NET1\n");
        let resp = ntrip_response(Some(&table), "NTRIP ntrip-caster/1.0");

        assert!(resp.contains("STR;MOUNT1;ident;RTCM\r\n"));
        assert!(!resp.contains("CAS;"));
        assert!(!resp.contains("NET;"));
        assert!(resp.ends_with("ENDSOURCETABLE\r\n"));
    }

    #[test]
    fn content_length_matches_body_byte_length() {
        let table = Sourcetable::parse("STR;MOUNT1;ident\nCAS;host\n");
        let resp = ntrip_response(Some(&table), "NTRIP ntrip-caster/1.0");

        let (headers, body) = resp.split_once("\r\n\r\n").unwrap();
        let declared: usize = headers
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        assert_eq!(declared, body.len());
    }

    #[test]
    fn missing_sourcetable_has_no_content_length() {
        let resp = ntrip_response(None, "NTRIP ntrip-caster/1.0");
        assert!(!resp.contains("Content-Length"));
        assert!(resp.contains("NO SOURCETABLE AVAILABLE"));
    }

    #[test]
    fn html_response_has_tables_for_each_record_kind() {
        let table = Sourcetable::parse("STR;MOUNT1;ident;RTCM\nCAS;host;2101\nNET;NET1\n");
        let ctx = RenderContext {
            server_name: "ntrip-caster",
            port: 2101,
            version: "1.0",
            ntrip_version: "Ntrip/2.0",
            now: "2026-07-26T00:00:00Z",
        };

        let resp = html_response(Some(&table), &ctx);
        assert!(resp.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(resp.contains("Content-Type: text/html"));
        assert!(resp.contains("<h2>Data Streams (STR)</h2>"));
        assert!(resp.contains("<h2>Casters (CAS)</h2>"));
        assert!(resp.contains("<h2>Networks (NET)</h2>"));
    }

    #[test]
    fn mountpoints_lists_str_record_paths_in_order() {
        let table = Sourcetable::parse("STR;MOUNT1;a\nCAS;host\nSTR;MOUNT2;b\n");
        assert_eq!(table.mountpoints(), vec!["MOUNT1", "MOUNT2"]);
    }

    #[test]
    fn store_rehash_if_stale_reloads_on_newer_mtime() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"STR;MOUNT1;a\n").unwrap();

        let store = SourcetableStore::new();
        assert!(store.rehash_if_stale(file.path()).unwrap());
        store.with_current(|table| {
            assert_eq!(table.unwrap().mountpoints(), vec!["MOUNT1"]);
        });

        assert!(!store.rehash_if_stale(file.path()).unwrap());
    }

    #[test]
    fn empty_fields_render_as_dash() {
        let table = Sourcetable::parse("STR;MOUNT1\n");
        let ctx = RenderContext {
            server_name: "s",
            port: 1,
            version: "1",
            ntrip_version: "1",
            now: "now",
        };

        let resp = html_response(Some(&table), &ctx);
        assert!(resp.contains("<td>-</td>"));
    }

    #[test]
    fn str_row_type_column_holds_the_record_tag_not_the_mountpoint() {
        let table = Sourcetable::parse("STR;MOUNT1;ident;RTCM 3.2\n");
        let ctx = RenderContext {
            server_name: "s",
            port: 1,
            version: "1",
            ntrip_version: "1",
            now: "now",
        };

        let resp = html_response(Some(&table), &ctx);
        let row = resp
            .split("<h2>Data Streams (STR)</h2>")
            .nth(1)
            .unwrap()
            .split("<tr>")
            .nth(2)
            .unwrap();

        // fields[0] is "STR" (the Type column), fields[1] is "MOUNT1" (the
        // Mountpoint column) — not shifted left by a dropped tag field.
        assert!(row.starts_with("<td>STR</td><td>MOUNT1</td><td>ident</td><td>RTCM 3.2</td>"));
    }
}
