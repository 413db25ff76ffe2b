
mod superseded_load;
