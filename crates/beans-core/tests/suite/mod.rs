mod population;
mod references;
mod registry;
mod resolution;
