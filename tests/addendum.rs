use stamp_qc_tools::addendum::{filter_input, write_addendums, Signatories, SpecialVariants};
use std::fs;
use std::io::Read;
use std::path::Path;

const CSV_HEADER: &str = "##Variants Of Sample\n#Gene,Chr:ChrPos,GeneStrand,HGVSProtein,Pathogenicity,VariantComment\n";

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn document_xml(path: &Path) -> String {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

fn names() -> Signatories {
    Signatories {
        resident: "Dr Resident".into(),
        director: "Dr Director".into(),
        signout: "Dr Attending".into(),
    }
}

#[test]
fn test_run_directory_document() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("STAMP2-301");
    write(
        &run.join("s1").join("s1_accepted_Report.csv"),
        &format!(
            "{CSV_HEADER}BRAF,7:140453136,-,p.Val600Glu,Pathogenic,\n\
             Sample Status Change,STAMP v2.4,\n"
        ),
    );
    write(&run.join("s1").join("s1.cnvs"), "Gene\tStatus\nERBB2\tAMP\n");
    write(&run.join("s1").join("s1.fusions.filtered.txt"), "Region1\tRegion2\nEML4\tALK\n");
    write(
        &run.join("s2").join("s2.csv"),
        &format!("{CSV_HEADER}TP53,17:7577120,-,p.Arg273His,Benign,\n"),
    );
    write(&run.join("s2").join("s2.bam"), "");

    let (runs, bad) = filter_input(&[run.clone()]).unwrap();
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0].reason, "Not a recognized input file");
    assert_eq!(runs[&run].len(), 2);

    let written = write_addendums(&runs, &SpecialVariants::default(), &names(), None).unwrap();
    assert_eq!(written.len(), 1);
    let outfile = run.join("pathology_addendums_STAMP2-301.docx");
    assert_eq!(written[0].outfile, outfile);
    assert_eq!(written[0].pages, 2);

    let xml = document_xml(&outfile);
    assert!(xml.contains("Fusion file: s1.fusions.filtered.txt"));
    assert!(xml.contains("version 2.4."));
    assert!(xml.contains("<w:t xml:space=\"preserve\">EML4-ALK</w:t>"));
    assert!(xml.contains(" V600E MUTATION"));
    assert!(xml.contains(" AMPLIFICATION"));
    assert!(xml.contains("NO PATHOGENIC OR LIKELY PATHOGENIC VARIANTS DETECTED"));
    assert!(xml.contains("Dr Resident/Dr Director/Dr Attending"));
    assert_eq!(xml.matches("<w:br w:type=\"page\"/>").count(), 1);

    // fusions come first, then CSV variants, then amplifications
    let fusion = xml.find("EML4-ALK").unwrap();
    let braf = xml.find("V600E").unwrap();
    let erbb2 = xml.find(">ERBB2<").unwrap();
    assert!(fusion < braf && braf < erbb2);
}

#[test]
fn test_loose_files_with_outfile() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("exports").join("s9_accepted_Report.csv");
    write(
        &csv,
        &format!("{CSV_HEADER}KRAS,12:25398284,-,NP_004976.2:p.Gly12Asp,Likely Pathogenic,\n"),
    );
    let (runs, bad) = filter_input(&[csv.clone()]).unwrap();
    assert!(bad.is_empty());
    assert!(runs[Path::new("")].contains_key("s9"));

    let outfile = dir.path().join("custom.docx");
    let written = write_addendums(&runs, &SpecialVariants::default(), &names(), Some(outfile.as_path())).unwrap();
    assert_eq!(written[0].outfile, outfile);
    let xml = document_xml(&outfile);
    assert!(xml.contains(" G12D MUTATION"));
    assert!(xml.contains("version unknown."));

    let written = write_addendums(&runs, &SpecialVariants::default(), &names(), None).unwrap();
    let default_out = dir.path().canonicalize().unwrap().join("pathology_addendums.docx");
    assert_eq!(written[0].outfile, default_out);
    assert!(default_out.exists());
}

#[test]
fn test_batch_continues_past_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    let good_run = dir.path().join("STAMP2-301");
    write(
        &good_run.join("s1").join("s1.csv"),
        &format!("{CSV_HEADER}BRAF,7:140453136,-,p.Val600Glu,Pathogenic,\n"),
    );
    let mixed_run = dir.path().join("STAMP2-302");
    write(
        &mixed_run.join("s2").join("s2.csv"),
        &format!("{CSV_HEADER}KRAS,NA,-,p.Gly12Asp,Pathogenic,\n"),
    );
    write(
        &mixed_run.join("s3").join("s3.csv"),
        &format!("{CSV_HEADER}TP53,17:7577120,-,p.Arg273His,Pathogenic,\n"),
    );
    let bad_fusions = mixed_run.join("s3").join("s3.fusions.filtered.txt");
    fs::write(&bad_fusions, [b'R', 0xff, 0xfe, b'\n']).unwrap();
    write(
        &mixed_run.join("s4").join("s4.csv"),
        &format!("{CSV_HEADER}KRAS,12:25398284,-,p.Gly12Asp,Pathogenic,\n"),
    );

    let (runs, bad) = filter_input(&[good_run.clone(), mixed_run.clone()]).unwrap();
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0].path, mixed_run.join("s2").join("s2.csv"));
    assert!(bad[0].reason.contains("Chr:ChrPos 'NA' is not chrom:position"));
    assert_eq!(runs.len(), 2);
    assert!(!runs[&mixed_run].contains_key("s2"));

    let written = write_addendums(&runs, &SpecialVariants::default(), &names(), None).unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0].pages, 1);
    assert!(written[0].failed.is_empty());
    assert!(document_xml(&written[0].outfile).contains(" V600E MUTATION"));

    assert_eq!(written[1].outfile, mixed_run.join("pathology_addendums_STAMP2-302.docx"));
    assert_eq!(written[1].pages, 1);
    assert_eq!(written[1].failed.len(), 1);
    assert_eq!(written[1].failed[0].path, bad_fusions);
    let xml = document_xml(&written[1].outfile);
    assert!(xml.contains(" G12D MUTATION"));
    assert!(!xml.contains("R273H"));
}
