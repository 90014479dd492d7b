use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use stamp_qc_tools::postprocess::{group_files_by_sample, PostProcessor};
use std::fs;
use std::path::Path;

const VARIANT_REPORT: &str = "# STAMP variant report\n\
Gene\tChr\tPosition\tRef\tVar\tVAF%\tStatus\n\
KRAS\tchr12\t25398284\tC\tT\t4.8\tREPORTED\n\
BRAF\tchr7\t140453136\tA\tT\t9.5\tREPORTED\n\
TP53\tchr17\t7577120\tC\tT\t2.1\tNOT_REPORTED\n\
EGFR\tchr7\t55242465\tG\tA\t1.2\tNOT_REPORTED\n";

const VCF: &str = "##fileformat=VCFv4.1\n\
#CHROM\tPOS\tID\tREF\tALT\n\
12\t25398284\t.\tC\tT\n\
7\t140453136\t.\tA\tT\n\
17\t7577120\t.\tC\tT\n\
7\t55242465\t.\tG\tA\n";

const INDEL_DEPTH: &str = "# indel depth\n\
Chr\tStart\tEnd\tDescription\tMin Depth\n\
chr7\t100\t200\tEGFR_exon19\t450\n\
chr12\t300\t400\tKRAS_exon2\t120\n\
chrY\t10\t20\tSRY_1\t80\n";

const SNV_DEPTH: &str = "Chr\tStart\tEnd\tDescription\tMin Depth\n\
chr17\t1\t2\tTP53_exon5\t199\n\
chr3\t5\t6\tPIK3CA_exon9\t900\n";

fn first_sheet(path: &Path) -> Range<Data> {
    let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
    workbook.worksheet_range_at(0).unwrap().unwrap()
}

fn text(range: &Range<Data>, row: u32, col: u32) -> String {
    range
        .get_value((row, col))
        .map(|v| v.to_string())
        .unwrap_or_default()
}

#[test]
fn test_process_sample_outputs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("s1.variant_report.txt"), VARIANT_REPORT).unwrap();
    fs::write(dir.path().join("s1.vcf"), VCF).unwrap();
    fs::write(dir.path().join("s1.depth_report_indels.txt"), INDEL_DEPTH).unwrap();
    fs::write(dir.path().join("s1.depth_report_snvs.txt"), SNV_DEPTH).unwrap();
    let outdir = dir.path().join("out");
    fs::create_dir(&outdir).unwrap();

    let (samples, bad) = group_files_by_sample(&[dir.path().to_path_buf()]).unwrap();
    assert!(bad.is_empty());
    let processor = PostProcessor::new(200, 60, Some(outdir.clone()));
    let outputs = processor.process_sample("s1", &samples["s1"]).unwrap();
    assert_eq!(outputs.files.len(), 6);

    // depth rows ordered by min depth, comment and header lines kept on top
    let depth = first_sheet(&outdir.join("s1.depth_report_indels.xlsx"));
    assert_eq!(text(&depth, 0, 0), "# indel depth");
    assert_eq!(text(&depth, 1, 4), "Min Depth");
    assert_eq!(text(&depth, 2, 3), "SRY_1");
    assert_eq!(text(&depth, 3, 3), "KRAS_exon2");
    assert_eq!(text(&depth, 4, 3), "EGFR_exon19");
    assert_eq!(depth.get_value((4, 4)), Some(&Data::Float(450.0)));

    // separator row before the first NOT_REPORTED variant
    let variants = first_sheet(&outdir.join("s1.variant_report.xlsx"));
    assert_eq!(text(&variants, 3, 0), "BRAF");
    assert_eq!(text(&variants, 4, 0), "");
    assert_eq!(text(&variants, 5, 0), "TP53");
    assert_eq!(text(&variants, 6, 6), "NOT_REPORTED");

    let split = outputs.vcf_split.unwrap();
    assert_eq!((split.accepted, split.rejected), (2, 2));
    let rejected = fs::read_to_string(outdir.join("s1_rejected.vcf")).unwrap();
    assert_eq!(
        rejected,
        "##fileformat=VCFv4.1\n#CHROM\tPOS\tID\tREF\tALT\n17\t7577120\t.\tC\tT\n7\t55242465\t.\tG\tA\n"
    );
    let accepted = fs::read_to_string(outdir.join("s1_accepted.vcf")).unwrap();
    assert!(accepted.contains("12\t25398284"));
    assert!(!accepted.contains("7577120"));

    let lcc = outputs.low_coverage.unwrap();
    assert!(!lcc.possibly_female);
    let comment = fs::read_to_string(outdir.join("s1.low_coverage_comment.txt")).unwrap();
    assert_eq!(
        comment,
        "Portions of the following gene(s) failed to meet the minimum coverage of 200x: \
         KRAS, SRY, and TP53. Low coverage may adversely affect the sensitivity of the assay. \
         If clinically indicated, repeat testing on a new specimen can be considered.\n"
    );
}

#[test]
fn test_low_coverage_female_comment() {
    let dir = tempfile::tempdir().unwrap();
    let indels = dir.path().join("s2.depth_report_indels.txt");
    let snvs = dir.path().join("s2.depth_report_snvs.txt");
    fs::write(
        &indels,
        "Chr\tStart\tEnd\tDescription\tMin Depth\nchrY\t10\t20\tSRY_1\t12\nchr7\t1\t2\tEGFR_1\t500\n",
    )
    .unwrap();
    fs::write(&snvs, "Chr\tStart\tEnd\tDescription\tMin_Depth\nchr7\t1\t2\tMET_14\t150\n").unwrap();

    let processor = PostProcessor::default();
    let (indel_report, _) = processor.depth_report_xlsx(&indels).unwrap();
    let (snv_report, _) = processor.depth_report_xlsx(&snvs).unwrap();
    let lcc = processor.low_coverage(&indel_report, &snv_report).unwrap();
    assert!(lcc.possibly_female);
    assert!(lcc.comment.starts_with("All chrY regions have coverage < 60.\nFEMALE (no chrY genes):\n"));
    assert!(lcc.comment.contains("200x: MET. Low coverage"));
    assert!(lcc.comment.contains("MALE:\nPortions of the following gene(s) failed to meet the minimum coverage of 200x: MET, and SRY."));
}

#[test]
fn test_depth_report_requires_min_depth() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s3.depth_report_snvs.txt");
    fs::write(&path, "Chr\tStart\tEnd\tDescription\nchr1\t1\t2\tX_1\n").unwrap();
    let err = PostProcessor::default().depth_report_xlsx(&path).unwrap_err();
    assert!(err.to_string().contains("Min Depth"));
}
