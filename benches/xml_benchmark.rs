use std::sync::Arc;

use divan::Bencher;
use netex_validate::libxml2::LibXml2Wrapper;

fn main() {
    divan::main();
}

const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns="http://www.netex.org.uk/netex" targetNamespace="http://www.netex.org.uk/netex">
    <xs:element name="PublicationDelivery">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="Description" type="xs:string" minOccurs="0"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

const VALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PublicationDelivery xmlns="http://www.netex.org.uk/netex">
    <Description>Valid content</Description>
</PublicationDelivery>"#;

const INVALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PublicationDelivery xmlns="http://www.netex.org.uk/netex">
    <Unexpected>Content</Unexpected>
</PublicationDelivery>"#;

#[divan::bench]
fn parse_schema(bencher: Bencher) {
    let wrapper = LibXml2Wrapper::new();
    let schema_data = SIMPLE_XSD.as_bytes();

    bencher.bench_local(move || wrapper.parse_schema_from_memory(schema_data).expect("failed to parse schema"));
}

#[divan::bench]
fn validate_valid_file(bencher: Bencher) {
    let wrapper = LibXml2Wrapper::new();
    let schema = Arc::new(wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap());

    use std::io::Write;
    use tempfile::NamedTempFile;
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", VALID_XML).unwrap();
    let path = file.path().to_path_buf();

    bencher.bench_local(move || wrapper.validate_file(&schema, &path).expect("validation failed"));
}

#[divan::bench]
fn validate_invalid_file(bencher: Bencher) {
    let wrapper = LibXml2Wrapper::new();
    let schema = Arc::new(wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap());

    use std::io::Write;
    use tempfile::NamedTempFile;
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", INVALID_XML).unwrap();
    let path = file.path().to_path_buf();

    bencher.bench_local(move || wrapper.validate_file(&schema, &path));
}
