/*!
# I/O Utilities for Saving Feature-Allocation Samples to CSV

The number of features changes from sample to sample under a nonparametric prior, so
allocation matrices are written in long format, one line per matrix entry. Enable via
the `csv` feature.
*/

use std::error::Error;
use std::fs::File;

use csv::Writer;

use crate::feature_matrix::FeatureAllocationMatrix;

/**
Saves feature-allocation samples as a long-format CSV file.

The samples are expected as **chain × sample**, as returned by
[`ChainRunner::run`](crate::core::ChainRunner::run). The file has the header
`chain,sample,row,feature,value` followed by one line per entry of every matrix.

# Examples

```rust
use pgfa::feature_matrix::FeatureAllocationMatrix;
use pgfa::io::csv::save_feature_matrices_csv;

let z = FeatureAllocationMatrix::from_rows(&[vec![1, 0], vec![0, 1]]).unwrap();
let samples = vec![vec![z.clone(), z]];
save_feature_matrices_csv(&samples, "/tmp/pgfa_samples.csv")?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_feature_matrices_csv(
    samples: &[Vec<FeatureAllocationMatrix>],
    filename: &str,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_writer(File::create(filename)?);
    wtr.write_record(["chain", "sample", "row", "feature", "value"])?;

    for (chain_idx, chain) in samples.iter().enumerate() {
        for (sample_idx, z) in chain.iter().enumerate() {
            for ((row, feature), value) in z.as_array().indexed_iter() {
                wtr.write_record(&[
                    chain_idx.to_string(),
                    sample_idx.to_string(),
                    row.to_string(),
                    feature.to_string(),
                    value.to_string(),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Saves the number of features of every sample as `chain,sample,num_features`.
pub fn save_num_features_csv(
    samples: &[Vec<FeatureAllocationMatrix>],
    filename: &str,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_writer(File::create(filename)?);
    wtr.write_record(["chain", "sample", "num_features"])?;

    for (chain_idx, chain) in samples.iter().enumerate() {
        for (sample_idx, z) in chain.iter().enumerate() {
            wtr.write_record(&[
                chain_idx.to_string(),
                sample_idx.to_string(),
                z.num_features().to_string(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
