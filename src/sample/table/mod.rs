use std::fs::File;
use std::io::Read;
use std::path::Path;
use nalgebra::*;
use super::{Point, Label, LabeledPoints, SampleError};

/// Parses labeled points from CSV content with a header row. The first three columns
/// are read as x, y and label (whatever their names); labels are 0/1 or bottom/top.
pub fn parse_labeled_points(content : &str) -> Result<LabeledPoints, SampleError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut pts = LabeledPoints::default();
    for (ix, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < 3 {
            return Err(SampleError::RowLength { row : ix + 1, found : record.len(), expected : 3 });
        }
        let x = parse_field(&record[0], ix + 1)?;
        let y = parse_field(&record[1], ix + 1)?;
        let label : Label = record[2].parse()?;
        pts.push(Point::new(x, y), label);
    }
    if pts.is_empty() {
        return Err(SampleError::Empty);
    }
    Ok(pts)
}

/// Parses a table of asset returns: the header holds the asset names, and each
/// following row holds the returns of every asset over one period. Returns the names
/// and a (periods x assets) matrix.
pub fn parse_returns(content : &str) -> Result<(Vec<String>, DMatrix<f64>), SampleError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let names : Vec<String> = reader.headers()?
        .iter()
        .map(|h| h.to_string() )
        .collect();
    let mut data : Vec<f64> = Vec::new();
    let mut nrows = 0;
    for (ix, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != names.len() {
            return Err(SampleError::RowLength { row : ix + 1, found : record.len(), expected : names.len() });
        }
        for field in record.iter() {
            data.push(parse_field(field, ix + 1)?);
        }
        nrows += 1;
    }
    if nrows == 0 {
        return Err(SampleError::Empty);
    }
    let ncols = names.len();
    Ok((names, DMatrix::from_row_slice(nrows, ncols, &data[..])))
}

fn parse_field(field : &str, row : usize) -> Result<f64, SampleError> {
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(SampleError::NonFinite(row))
    }
}

/// Read from a text file, returning its contents as a String
pub fn load_content_from_file(path : impl AsRef<Path>) -> Result<String, SampleError> {
    let mut f = File::open(path)?;
    let mut content = String::new();
    f.read_to_string(&mut content)?;
    Ok(content)
}

pub fn load_labeled_points(path : impl AsRef<Path>) -> Result<LabeledPoints, SampleError> {
    parse_labeled_points(&load_content_from_file(path)?)
}

pub fn load_returns(path : impl AsRef<Path>) -> Result<(Vec<String>, DMatrix<f64>), SampleError> {
    parse_returns(&load_content_from_file(path)?)
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn parse_points_with_mixed_labels() {
        let content = "height,weight,group\n1.5,40,0\n1.8, 95, top\n2.0,70,bottom\n";
        let pts = parse_labeled_points(content).unwrap();
        assert_eq!(pts.bottom().len(), 2);
        assert_eq!(pts.top(), &[Point::new(1.8, 95.)]);
    }

    #[test]
    fn parse_points_rejects_bad_values() {
        assert!(matches!(parse_labeled_points("x,y,l\n1,abc,0\n"), Err(SampleError::NonFinite(1))));
        assert!(matches!(parse_labeled_points("x,y,l\n1,2,3\n"), Err(SampleError::UnknownLabel(_))));
        assert!(matches!(parse_labeled_points("x,y,l\n"), Err(SampleError::Empty)));
    }

    #[test]
    fn parse_returns_table() {
        let content = "A,B\n0.1,0.2\n0.3,0.4\n0.5,0.6\n";
        let (names, returns) = parse_returns(content).unwrap();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(returns.shape(), (3, 2));
        assert_eq!(returns[(2, 1)], 0.6);
    }

}
