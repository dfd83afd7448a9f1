//! LibXML2 FFI wrapper (§4.8).
//!
//! ## Why FFI instead of a pure-Rust validator
//!
//! No mature pure-Rust crate performs XML Schema (XSD) validation:
//! `roxmltree` and `quick-xml` parse but don't validate against a schema,
//! `yaserde` targets (de)serialization, and `xsd-parser` generates types
//! rather than validating instance documents at runtime. libxml2 remains
//! the only practical option, so this module binds it directly rather than
//! through the `libxml` crate, whose `SchemaValidationContext` wrapper
//! documents itself as untested under concurrent use and adds an
//! indirection layer with no offsetting benefit here.
//!
//! ## Thread safety
//!
//! libxml2 documents ([xmlsoft.org/threads.html](http://xmlsoft.org/threads.html))
//! that schema *validation* is thread-safe once a schema is parsed, but
//! schema *parsing* and *global resolver registration* are not. This module
//! therefore serializes parsing and buffer-provider registration behind
//! `std::sync::Once`/`Mutex`, while leaving validation itself free to run
//! on any thread that holds a cloned [`XmlSchemaPtr`].

use std::collections::HashMap;
use std::ffi::CString;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, Once, OnceLock};

use libc::{FILE, c_char, c_int, c_uint, c_void};

use crate::error::{xsd_error, EngineError, ValidationError};

static LIBXML2_INIT: Once = Once::new();

type LibXml2Result<T> = Result<T, EngineError>;

#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    pub fn xmlSchemaNewMemParserCtxt(buffer: *const c_char, size: c_int) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaValidateFile(ctxt: *const XmlSchemaValidCtxt, file_name: *const c_char, options: c_uint) -> c_int;
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;
    pub fn xmlSchemaSetValidStructuredErrors(ctxt: *mut XmlSchemaValidCtxt, sherr: XmlStructuredErrorFunc, ctx: *mut c_void);

    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    pub fn xmlRegisterInputCallbacks(
        match_func: XmlInputMatchCallback,
        open_func: XmlInputOpenCallback,
        read_func: XmlInputReadCallback,
        close_func: XmlInputCloseCallback,
    ) -> c_int;

    pub fn xmlSchemaDump(output: *mut FILE, schema: *const XmlSchema);
}

/// Forbid network access during XSD parse/validate (`XML_PARSE_NONET`).
const XML_PARSE_NONET: c_int = 1 << 11;

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc = Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;
pub type XmlInputMatchCallback = Option<unsafe extern "C" fn(filename: *const c_char) -> c_int>;
pub type XmlInputOpenCallback = Option<unsafe extern "C" fn(filename: *const c_char) -> *mut c_void>;
pub type XmlInputReadCallback = Option<unsafe extern "C" fn(context: *mut c_void, buffer: *mut c_char, len: c_int) -> c_int>;
pub type XmlInputCloseCallback = Option<unsafe extern "C" fn(context: *mut c_void) -> c_int>;

/// Captured validation diagnostics, collected through a structured error
/// callback rather than parsed off stderr, line/column included when the
/// engine supplies them.
struct CapturedError {
    message: String,
    line: Option<u32>,
    column: Option<u32>,
}

unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    let errors = unsafe { &mut *(user_data as *mut Vec<CapturedError>) };
    if error.is_null() {
        return;
    }
    let msg_ptr = unsafe { (*error).message };
    if msg_ptr.is_null() {
        return;
    }
    let c_str = unsafe { std::ffi::CStr::from_ptr(msg_ptr) };
    if let Ok(s) = c_str.to_str() {
        let line = unsafe { (*error).line };
        errors.push(CapturedError {
            message: s.trim().to_string(),
            line: if line > 0 { Some(line as u32) } else { None },
            column: None,
        });
    }
}

/// Process-wide `file://` URL -> bytes map, consulted by the registered
/// input callbacks before libxml2 falls back to its filesystem resolver
/// (§4.8 item 1). Preloading an already-loaded directory is a no-op.
struct BufferProvider {
    buffers: Mutex<HashMap<String, Arc<Vec<u8>>>>,
    preloaded_roots: Mutex<std::collections::HashSet<std::path::PathBuf>>,
}

struct ReadCursor {
    data: Arc<Vec<u8>>,
    pos: usize,
}

fn buffer_provider() -> &'static BufferProvider {
    static PROVIDER: OnceLock<BufferProvider> = OnceLock::new();
    PROVIDER.get_or_init(|| BufferProvider {
        buffers: Mutex::new(HashMap::new()),
        preloaded_roots: Mutex::new(std::collections::HashSet::new()),
    })
}

fn to_file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

extern "C" fn buffer_match(filename: *const c_char) -> c_int {
    if filename.is_null() {
        return 0;
    }
    let key = unsafe { std::ffi::CStr::from_ptr(filename) }.to_string_lossy().to_string();
    let provider = buffer_provider();
    provider.buffers.lock().expect("buffer lock").contains_key(&key) as c_int
}

extern "C" fn buffer_open(filename: *const c_char) -> *mut c_void {
    if filename.is_null() {
        return std::ptr::null_mut();
    }
    let key = unsafe { std::ffi::CStr::from_ptr(filename) }.to_string_lossy().to_string();
    let provider = buffer_provider();
    let data = provider.buffers.lock().expect("buffer lock").get(&key).cloned();
    match data {
        Some(data) => Box::into_raw(Box::new(ReadCursor { data, pos: 0 })) as *mut c_void,
        None => std::ptr::null_mut(),
    }
}

extern "C" fn buffer_read(context: *mut c_void, buffer: *mut c_char, len: c_int) -> c_int {
    if context.is_null() || buffer.is_null() || len <= 0 {
        return 0;
    }
    let cursor = unsafe { &mut *(context as *mut ReadCursor) };
    let remaining = cursor.data.len().saturating_sub(cursor.pos);
    let to_copy = remaining.min(len as usize);
    if to_copy == 0 {
        return 0;
    }
    unsafe {
        std::ptr::copy_nonoverlapping(cursor.data[cursor.pos..].as_ptr() as *const c_char, buffer, to_copy);
    }
    cursor.pos += to_copy;
    to_copy as c_int
}

extern "C" fn buffer_close(context: *mut c_void) -> c_int {
    if !context.is_null() {
        unsafe {
            drop(Box::from_raw(context as *mut ReadCursor));
        }
    }
    0
}

static BUFFER_CALLBACKS_REGISTERED: Once = Once::new();

/// Walk `dir` for `.xsd` files and load them into the buffer provider keyed
/// by `file://` URL, registering the resolver with libxml2 on first use.
/// Preloading the same directory twice is a cheap no-op.
pub fn preload_schema_directory(dir: &Path) -> std::io::Result<()> {
    BUFFER_CALLBACKS_REGISTERED.call_once(|| unsafe {
        // Registered ahead of libxml2's own filesystem resolver so
        // xsd:include/xsd:import resolve from memory first.
        xmlRegisterInputCallbacks(Some(buffer_match), Some(buffer_open), Some(buffer_read), Some(buffer_close));
    });

    let provider = buffer_provider();
    {
        let mut roots = provider.preloaded_roots.lock().expect("roots lock");
        if roots.contains(dir) {
            return Ok(());
        }
        roots.insert(dir.to_path_buf());
    }

    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("xsd")) {
                let bytes = std::fs::read(&path)?;
                provider
                    .buffers
                    .lock()
                    .expect("buffer lock")
                    .insert(to_file_url(&path), Arc::new(bytes));
            }
        }
    }
    Ok(())
}

/// Thread-safe wrapper for a compiled libxml2 schema. Cheap to clone; all
/// clones share ownership of the underlying native pointer via `Arc`.
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: libxml2 documents xmlSchema structures as thread-safe for reading
// once parsed. See http://xmlsoft.org/threads.html.
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    unsafe fn from_raw(ptr: *mut XmlSchema) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(EngineError::SchemaResolution("libxml2 returned a null compiled schema".to_string()));
        }
        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner { ptr, _phantom: PhantomData }),
        })
    }

    fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr { inner: Arc::clone(&self.inner) }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Safe entry point into libxml2: schema parsing and XML validation, either
/// from a file path or from an in-memory buffer.
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
        });
        LibXml2Wrapper { _phantom: PhantomData }
    }

    /// Parse an XSD from memory. Not safe to call concurrently with another
    /// parse on a different thread; validators are cached precisely so this
    /// runs once per distinct schema (see `cache.rs`).
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
        unsafe {
            let parser_ctxt = xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, schema_data.len() as c_int);
            if parser_ctxt.is_null() {
                return Err(EngineError::SchemaResolution("failed to allocate a schema parser context".to_string()));
            }
            let schema_ptr = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);
            if schema_ptr.is_null() {
                return Err(EngineError::SchemaResolution("the XSD entry document failed to parse".to_string()));
            }
            XmlSchemaPtr::from_raw(schema_ptr)
        }
    }

    /// Validate an XML document already on disk.
    pub fn validate_file(&self, schema: &XmlSchemaPtr, file_path: &Path) -> LibXml2Result<Vec<ValidationError>> {
        let path_str = file_path.to_str().ok_or_else(|| {
            EngineError::SchemaResolution(format!("path is not valid UTF-8: {}", file_path.display()))
        })?;
        let c_path = CString::new(path_str)
            .map_err(|_| EngineError::SchemaResolution("path contains an interior NUL byte".to_string()))?;

        unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(EngineError::SchemaResolution("failed to create a validation context".to_string()));
            }
            let mut captured: Vec<CapturedError> = Vec::new();
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                &mut captured as *mut Vec<CapturedError> as *mut c_void,
            );
            let code = xmlSchemaValidateFile(valid_ctxt, c_path.as_ptr(), 0);
            xmlSchemaFreeValidCtxt(valid_ctxt);
            Ok(captured_to_errors(code, captured))
        }
    }

    /// Validate XML content already in memory (§4.8 item 4): parse with
    /// network access forbidden, validate against `schema`, and always
    /// dispose the parsed document regardless of outcome. A document that
    /// fails to parse at all is reported as a single `xsdError`, not a hard
    /// failure — the caller keeps running the rest of its pipeline.
    pub fn validate_memory(&self, schema: &XmlSchemaPtr, xml_content: &[u8], file_name: Option<&str>) -> LibXml2Result<Vec<ValidationError>> {
        let url = file_name.map(|n| CString::new(n).unwrap_or_default());
        let doc = unsafe {
            xmlReadMemory(
                xml_content.as_ptr() as *const c_char,
                xml_content.len() as c_int,
                url.as_ref().map(|c| c.as_ptr()).unwrap_or(std::ptr::null()),
                std::ptr::null(),
                XML_PARSE_NONET,
            )
        };
        if doc.is_null() {
            return Ok(vec![xsd_error("the document is not well-formed XML", None, None)]);
        }

        let result = unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                xmlFreeDoc(doc);
                return Err(EngineError::SchemaResolution("failed to create a validation context".to_string()));
            }
            let mut captured: Vec<CapturedError> = Vec::new();
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                &mut captured as *mut Vec<CapturedError> as *mut c_void,
            );
            let code = xmlSchemaValidateDoc(valid_ctxt, doc);
            xmlSchemaFreeValidCtxt(valid_ctxt);
            captured_to_errors(code, captured)
        };
        unsafe {
            xmlFreeDoc(doc);
        }
        Ok(result)
    }
}

fn captured_to_errors(code: c_int, captured: Vec<CapturedError>) -> Vec<ValidationError> {
    if code == 0 {
        return Vec::new();
    }
    if captured.is_empty() {
        return vec![xsd_error(&format!("schema validation failed with code {code}"), None, None)];
    }
    captured
        .into_iter()
        .map(|c| xsd_error(&c.message, c.line, c.column))
        .collect()
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

    #[test]
    fn wrapper_creation_does_not_panic() {
        let wrapper = LibXml2Wrapper::new();
        drop(wrapper);
    }

    #[test]
    fn schema_parsing_succeeds_for_valid_xsd() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap();
        assert!(schema.is_valid());
    }

    #[test]
    fn schema_parsing_rejects_non_schema_input() {
        let wrapper = LibXml2Wrapper::new();
        let result = wrapper.parse_schema_from_memory(b"<invalid>not a schema</invalid>");
        assert!(matches!(result, Err(EngineError::SchemaResolution(_))));
    }

    #[test]
    fn schema_parsing_rejects_empty_input() {
        let wrapper = LibXml2Wrapper::new();
        assert!(wrapper.parse_schema_from_memory(&[]).is_err());
    }

    #[test]
    fn validate_memory_accepts_matching_document() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap();
        let errors = wrapper
            .validate_memory(&schema, b"<root>hello</root>", Some("doc.xml"))
            .unwrap();
        assert!(errors.is_empty());
    }

    #[test]
    fn validate_memory_reports_malformed_xml() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap();
        let errors = wrapper.validate_memory(&schema, b"<root>unterminated", Some("doc.xml")).unwrap();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn schema_ptr_clones_share_the_same_pointer() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap();
        let cloned = schema.clone();
        assert_eq!(schema.as_ptr(), cloned.as_ptr());
    }

    #[test]
    fn concurrent_validation_is_safe_across_threads() {
        use rayon::prelude::*;

        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap();

        let results: Vec<_> = (0..10)
            .into_par_iter()
            .map(|_| {
                let w = LibXml2Wrapper::new();
                w.validate_memory(&schema, b"<root>hi</root>", None).unwrap().is_empty()
            })
            .collect();

        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|&ok| ok));
    }

    #[test]
    fn preload_schema_directory_registers_buffers() {
        let dir = std::env::temp_dir().join(format!("netex-validate-test-{:p}", &SIMPLE_XSD));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("entry.xsd"), SIMPLE_XSD).unwrap();
        preload_schema_directory(&dir).unwrap();
        let key = to_file_url(&dir.join("entry.xsd"));
        assert!(buffer_provider().buffers.lock().unwrap().contains_key(&key));
        std::fs::remove_dir_all(&dir).ok();
    }
}
